//! Fast, per-page table extraction from a markdown rendering of the page.


pub mod tabulasource;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::{
    markdown,
    table::{RawTable, Table, TableSource},
};

/// Share of empty cells above which a block is considered sparse.
pub const EMPTY_CELL_RATIO_LIMIT: f64 = 0.2;

const INCONSISTENT_COLUMNS_FACTOR: f64 = 0.7;
const SPARSE_FACTOR: f64 = 0.6;
const SHORT_TABLE_FACTOR: f64 = 0.5;

/// Renders single PDF pages as markdown text.
pub trait PageMarkdownSource {
    /// Renders the zero-based `page` of the PDF as markdown, with tables as `|`-delimited blocks.
    fn page_markdown(&self, pdf_path: &Path, page: usize) -> Result<String>;
}

impl<T> PageMarkdownSource for &T
where
    T: PageMarkdownSource + ?Sized,
{
    fn page_markdown(&self, pdf_path: &Path, page: usize) -> Result<String> {
        (*self).page_markdown(pdf_path, page)
    }
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("PDF not found: {0:?}")]
pub struct PdfNotFound(pub PathBuf);

/// A table block found by the fast pass, with structural estimates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkdownQualityResult {
    /// Raw lines of the block, joined by newlines.
    pub markdown_text: String,
    /// Data rows, excluding the header.
    pub estimated_rows: usize,
    pub estimated_cols: usize,
    /// Quality estimate in `[0, 1]`.
    pub confidence: f64,
    /// Zero-based page index.
    pub page: usize,
}

impl MarkdownQualityResult {
    /// Builds the result for one block of lines, or `None` if the block has no data lines.
    pub fn from_block(lines: &[&str], page: usize) -> Option<Self> {
        let data_lines: Vec<&str> = data_lines(lines.iter().copied()).collect();
        let first = data_lines.first()?;

        let columns = markdown::column_count(first);
        Some(Self {
            markdown_text: lines.join("\n"),
            estimated_rows: data_lines.len().saturating_sub(1),
            estimated_cols: columns.max(1),
            confidence: block_confidence(&data_lines, columns),
            page,
        })
    }

    /// Ratio of empty cells to all cells over the block's table lines, in `[0, 1]`.
    pub fn empty_cell_ratio(&self) -> f64 {
        let table_lines: Vec<&str> = self
            .markdown_text
            .lines()
            .filter(|line| markdown::is_table_line(line))
            .collect();
        if table_lines.is_empty() {
            return 0.0;
        }
        let empty: usize = table_lines
            .iter()
            .map(|line| markdown::empty_cell_count(line))
            .sum();
        let total: usize = table_lines
            .iter()
            .map(|line| markdown::column_count(line))
            .sum();
        empty as f64 / total.max(1) as f64
    }

    /// Parses the block's rows into a [RawTable].
    pub fn to_raw_table(&self) -> RawTable {
        RawTable {
            page: self.page,
            source: TableSource::Fast,
            table: Table::from_markdown_lines(self.markdown_text.lines()),
        }
    }
}

/// Table lines of a block that are not header separators.
fn data_lines<'a>(lines: impl Iterator<Item = &'a str>) -> impl Iterator<Item = &'a str> {
    lines.filter(|line| markdown::is_table_line(line) && !markdown::is_separator(line))
}

fn block_confidence(data_lines: &[&str], expected_cols: usize) -> f64 {
    if data_lines.is_empty() {
        return 0.0;
    }

    let consistent = data_lines
        .iter()
        .all(|line| markdown::column_count(line) == expected_cols);
    let empty: usize = data_lines
        .iter()
        .map(|line| markdown::empty_cell_count(line))
        .sum();
    let total = (data_lines.len() * expected_cols).max(1);
    let empty_ratio = empty as f64 / total as f64;

    let mut confidence = 1.0;
    if !consistent {
        confidence *= INCONSISTENT_COLUMNS_FACTOR;
    }
    if empty_ratio > EMPTY_CELL_RATIO_LIMIT {
        confidence *= SPARSE_FACTOR;
    }
    if data_lines.len() < 2 {
        confidence *= SHORT_TABLE_FACTOR;
    }
    f64::clamp(confidence, 0.0, 1.0)
}

/// Extracts table blocks from single pages via a [PageMarkdownSource].
pub struct FastExtractor<S> {
    source: S,
}

impl<S> FastExtractor<S>
where
    S: PageMarkdownSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Extracts every table block on the zero-based `page`.
    ///
    /// A missing PDF is an error. A failure of the markdown source is logged and yields no
    /// tables, so that a single bad page does not stop a document run.
    pub fn extract_tables_from_page(
        &self,
        pdf_path: &Path,
        page: usize,
    ) -> Result<Vec<MarkdownQualityResult>> {
        if !pdf_path.exists() {
            return Err(PdfNotFound(pdf_path.to_owned()).into());
        }

        let text = match self.source.page_markdown(pdf_path, page) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Fast extraction of page {} failed: {err:#}", page + 1);
                return Ok(Vec::new());
            }
        };

        let tables: Vec<MarkdownQualityResult> = markdown::split_blocks(&text)
            .iter()
            .filter_map(|block| MarkdownQualityResult::from_block(block, page))
            .collect();
        log::debug!("Found {} table block(s) on page {}.", tables.len(), page + 1);

        Ok(tables)
    }
}
