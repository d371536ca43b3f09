//! Helpers for the `|`-delimited markdown tables that both extractors emit.


use crate::table::Row;

/// Cell delimiter that every table line starts with.
pub const CELL_DELIMITER: char = '|';

/// Returns `true` if the line is a table row or separator line.
pub fn is_table_line(line: &str) -> bool {
    line.trim().starts_with(CELL_DELIMITER)
}

/// Returns `true` for header separator lines such as `|---|:--:|`.
pub fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with(CELL_DELIMITER)
        && trimmed.contains('-')
        && trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Number of columns on a table line, counted from its delimiters.
pub fn column_count(line: &str) -> usize {
    line.trim()
        .matches(CELL_DELIMITER)
        .count()
        .saturating_sub(1)
}

/// Splits a table line into trimmed cell strings.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == "|" {
        return Vec::new();
    }
    let inner = trimmed.strip_prefix(CELL_DELIMITER).unwrap_or(trimmed);
    let inner = inner.strip_suffix(CELL_DELIMITER).unwrap_or(inner);
    inner
        .split(CELL_DELIMITER)
        .map(|cell| cell.trim().to_owned())
        .collect()
}

/// Number of empty cells on a table line.
pub fn empty_cell_count(line: &str) -> usize {
    split_cells(line)
        .iter()
        .filter(|cell| cell.is_empty())
        .count()
}

/// Splits page markdown into table blocks.
///
/// A block is a run of lines starting with `|`. Inside a block, lines starting with `-`, `=` or
/// `*` are kept as separator decorations. A blank line or any other line ends the block.
pub fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.starts_with(CELL_DELIMITER) {
            current.push(line);
        } else if !current.is_empty() && stripped.starts_with(['-', '=', '*']) {
            current.push(line);
        } else if !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

/// Splits markdown into runs of lines that contain a `|` anywhere.
///
/// This is the looser grouping used for layout-model output, where table rows are not always
/// flush with the left margin.
pub fn split_loose_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.contains(CELL_DELIMITER) {
            current.push(line);
        } else if !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

/// Renders a single row as a markdown table line.
pub fn render_row(cells: &[String]) -> String {
    let mut line = String::from("|");
    for cell in cells {
        line.push(' ');
        // Embedded delimiters would shift every following column.
        line.push_str(&cell.replace(CELL_DELIMITER, "/").replace('\n', " "));
        line.push_str(" |");
    }
    line
}

/// Renders a header row, a separator line and data rows as a markdown table.
pub fn render_table(header: &Row, rows: &[Row]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render_row(header));
    lines.push(render_separator(header.len().max(1)));
    lines.extend(rows.iter().map(|row| render_row(row)));
    lines.join("\n")
}

fn render_separator(width: usize) -> String {
    let mut line = String::from("|");
    for _ in 0..width {
        line.push_str("---|");
    }
    line
}
