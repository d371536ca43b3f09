//! Separates a table's real header and data rows from the titles and captions around them.


use serde::{Deserialize, Serialize};

use crate::{
    markdown,
    table::{RawTable, Row},
};

/// How far above the first data row to look for the header.
const HEADER_LOOKBACK_ROWS: usize = 10;
const HEADER_MIN_FILL_RATIO: f64 = 0.5;
const HEADER_KEYWORDS: [&str; 6] = ["zone", "< ", "> ", "to ", "°", "degree"];

/// Row labels that mark a data row when they appear, alone, in the first cell.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelVocabulary(Vec<String>);

impl LabelVocabulary {
    pub fn new<S: AsRef<str>>(labels: impl IntoIterator<Item = S>) -> Self {
        Self(
            labels
                .into_iter()
                .map(|label| label.as_ref().trim().to_lowercase())
                .filter(|label| !label.is_empty())
                .collect(),
        )
    }

    /// Case-insensitive exact match after trimming.
    pub fn contains(&self, cell: &str) -> bool {
        let needle = cell.trim().to_lowercase();
        self.0.iter().any(|label| *label == needle)
    }
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        Self::new(["walls", "roofs", "floors", "windows", "doors", "skylights"])
    }
}

impl From<Vec<String>> for LabelVocabulary {
    fn from(value: Vec<String>) -> Self {
        Self::new(value)
    }
}

impl From<LabelVocabulary> for Vec<String> {
    fn from(value: LabelVocabulary) -> Self {
        value.0
    }
}

/// Header and data rows of a table, with surrounding titles and captions removed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CleanedTable {
    pub headers: Row,
    pub rows: Vec<Row>,
    /// Raw row index of each rendered row, header first. `None` for a generated header.
    pub source_rows: Vec<Option<usize>>,
}

impl CleanedTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        markdown::render_table(&self.headers, &self.rows)
    }

    /// Row of [Self::to_markdown] rendered from raw row `source_row`, counting the header as row 0
    /// and skipping the separator. `None` if the raw row was dropped.
    pub fn rendered_row(&self, source_row: usize) -> Option<usize> {
        self.source_rows
            .iter()
            .position(|&source| source == Some(source_row))
    }
}

/// Cleans a raw table.
///
/// Data rows are those whose first cell is in `vocabulary` and that have a numeric value in some
/// other cell. The header is the last header-like row in the ten rows above the first data row,
/// else the row just above it, else generated `Column {i}` labels. Without any vocabulary row,
/// the first row is the header and all others are data.
pub fn clean_table(raw: &RawTable, vocabulary: &LabelVocabulary) -> CleanedTable {
    let rows = &raw.table;
    if rows.is_empty() {
        return CleanedTable::default();
    }

    let data: Vec<(usize, Row)> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| is_data_row(row, vocabulary))
        .map(|(idx, row)| (idx, row.trimmed()))
        .collect();

    let Some(&(first_data_idx, _)) = data.first() else {
        let mut remaining = rows.iter().map(Row::trimmed);
        return CleanedTable {
            headers: remaining.next().unwrap_or_default(),
            rows: remaining.collect(),
            source_rows: (0..rows.len()).map(Some).collect(),
        };
    };

    let lookback_start = first_data_idx.saturating_sub(HEADER_LOOKBACK_ROWS);
    let header_idx = (lookback_start..first_data_idx)
        .rev()
        .find(|&idx| looks_like_header(&rows[idx]))
        .or_else(|| first_data_idx.checked_sub(1));
    let headers = header_idx.map_or_else(
        || {
            let width = data.first().map_or(0, |(_, row)| row.len());
            Row((0..width).map(|i| format!("Column {i}")).collect())
        },
        |idx| rows[idx].trimmed(),
    );

    let mut source_rows = vec![header_idx];
    source_rows.extend(data.iter().map(|&(idx, _)| Some(idx)));

    CleanedTable {
        headers,
        rows: data.into_iter().map(|(_, row)| row).collect(),
        source_rows,
    }
}

fn is_data_row(row: &Row, vocabulary: &LabelVocabulary) -> bool {
    let Some((label, values)) = row.split_first() else {
        return false;
    };
    vocabulary.contains(label)
        && values
            .iter()
            .filter(|cell| !cell.trim().is_empty())
            .any(|cell| is_numeric_token(cell))
}

/// Digits only, once `.`, `,`, `≥`, `≤` and spaces are removed.
pub fn is_numeric_token(cell: &str) -> bool {
    let mut digits = cell
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '≥' | '≤' | ' '))
        .peekable();
    digits.peek().is_some() && digits.all(|c| c.is_ascii_digit())
}

fn looks_like_header(row: &Row) -> bool {
    if row.is_empty() {
        return false;
    }
    let fill_ratio = row.non_empty_count() as f64 / row.len() as f64;
    let text = row.join(" ").to_lowercase();
    fill_ratio >= HEADER_MIN_FILL_RATIO && HEADER_KEYWORDS.iter().any(|kw| text.contains(kw))
}
