
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::markdown;

/// Extraction stage that produced a table.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TableSource {
    /// Fast markdown extraction of a single page.
    Fast,
    /// Layout-model extraction of the whole document.
    Layout,
}

/// Rows of cells as read from an extractor. Rows may have differing lengths.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Table(pub Vec<Row>);

impl Table {
    /// Parses the `|`-delimited lines of a markdown table block into rows, skipping separator
    /// lines and any line that is not part of the table.
    pub fn from_markdown_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Table(
            lines
                .into_iter()
                .filter(|line| markdown::is_table_line(line) && !markdown::is_separator(line))
                .map(|line| Row(markdown::split_cells(line)))
                .collect(),
        )
    }
}

impl Deref for Table {
    type Target = Vec<Row>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Table {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<C, R> From<C> for Table
where
    C: IntoIterator<Item = R>,
    R: Into<Row>,
{
    fn from(value: C) -> Self {
        Table(value.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(pub Vec<String>);

impl Row {
    /// Returns `true` if no cell holds any non-whitespace text.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|cell| cell.trim().is_empty())
    }

    /// Number of cells holding non-whitespace text.
    pub fn non_empty_count(&self) -> usize {
        self.0.iter().filter(|cell| !cell.trim().is_empty()).count()
    }

    /// Copy of the row with every cell trimmed.
    pub fn trimmed(&self) -> Row {
        Row(self.0.iter().map(|cell| cell.trim().to_owned()).collect())
    }

    fn padded_to(mut self, width: usize) -> Row {
        if self.0.len() < width {
            self.0.resize(width, String::new());
        }
        self
    }
}

impl Deref for Row {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Row {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<C, S> From<C> for Row
where
    C: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from(value: C) -> Self {
        Row(value.into_iter().map(Into::into).collect())
    }
}

/// A table as produced by an extractor, before any cleaning.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RawTable {
    /// Zero-based page index.
    pub page: usize,
    pub source: TableSource,
    pub table: Table,
}

/// Rectangular grid of cells: a header row and data rows that all share the header's width.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Grid {
    header: Row,
    rows: Vec<Row>,
}

impl Grid {
    /// Creates a [Grid] by padding the header and every row with empty cells up to the widest of
    /// them.
    pub fn padded(header: Row, rows: Vec<Row>) -> Self {
        let width = rows
            .iter()
            .map(|row| row.len())
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        Self {
            header: header.padded_to(width),
            rows: rows.into_iter().map(|row| row.padded_to(width)).collect(),
        }
    }

    pub fn header(&self) -> &Row {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Header followed by the data rows, as a ragged [Table].
    pub fn to_table(&self) -> Table {
        Table(
            std::iter::once(self.header.clone())
                .chain(self.rows.iter().cloned())
                .collect(),
        )
    }
}
