//! Slow, whole-document extraction through a layout-aware model.
//!
//! The model converts a whole PDF into paginated markdown in one expensive pass. The result is
//! cached on disk per document (see [cache]) and the tables of a single page are read back out of
//! it on demand.


pub mod cache;
pub mod command;

use std::{
    path::Path,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use lazy_regex::regex_captures;
use serde::{Deserialize, Serialize};

use crate::{
    fast::PdfNotFound,
    markdown,
    table::{Grid, RawTable, Row, Table, TableSource},
};

/// Converts whole PDF documents into per-page markdown.
pub trait LayoutModel {
    fn convert(&self, pdf_path: &Path) -> Result<LayoutDocument>;
}

impl<T> LayoutModel for &T
where
    T: LayoutModel + ?Sized,
{
    fn convert(&self, pdf_path: &Path) -> Result<LayoutDocument> {
        (*self).convert(pdf_path)
    }
}

/// Markdown of one page of a [LayoutDocument].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LayoutPage {
    /// Zero-based page index.
    pub index: usize,
    pub markdown: String,
}

/// Output of a [LayoutModel] run over a whole document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LayoutDocument {
    pub pages: Vec<LayoutPage>,
    /// Free-form metadata reported by the model.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LayoutDocument {
    /// Splits markdown with page markers of the form `{N}------` into pages. Text before the
    /// first marker belongs to page 0. Pages without any text are left out.
    pub fn from_paginated_markdown(
        markdown: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut pages: Vec<LayoutPage> = Vec::new();
        let mut current = LayoutPage::default();

        for line in markdown.lines() {
            let marker = regex_captures!(r"^\s*\{(\d+)\}-{3,}\s*$", line)
                .and_then(|(_, index)| index.parse::<usize>().ok());
            match marker {
                Some(index) if index == current.index => {}
                Some(index) => {
                    let next = LayoutPage {
                        index,
                        markdown: String::new(),
                    };
                    let finished = std::mem::replace(&mut current, next);
                    if !finished.markdown.trim().is_empty() {
                        pages.push(finished);
                    }
                }
                None => {
                    current.markdown.push_str(line);
                    current.markdown.push('\n');
                }
            }
        }
        if !current.markdown.trim().is_empty() {
            pages.push(current);
        }

        Self { pages, metadata }
    }

    pub fn page(&self, index: usize) -> Option<&LayoutPage> {
        self.pages.iter().find(|page| page.index == index)
    }
}

/// A table read from layout-model output. Rows may be ragged.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayoutTable {
    pub cells: Table,
    pub headers: Row,
    /// Zero-based page index.
    pub page: usize,
    /// Cell bounding boxes as `[left, top, right, bottom]`, when the model reports them.
    pub bboxes: Option<Vec<[f64; 4]>>,
}

/// A [LayoutTable] reduced to a rectangular grid.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedLayoutTable {
    pub grid: Grid,
    pub page: usize,
    pub bboxes: Option<Vec<[f64; 4]>>,
    /// Merged regions found on the raw rows, moved onto the rows of [Self::to_raw_table]. Regions
    /// on dropped rows are left out.
    pub merged_cells: Vec<MergedRegion>,
}

impl NormalizedLayoutTable {
    pub fn to_raw_table(&self) -> RawTable {
        RawTable {
            page: self.page,
            source: TableSource::Layout,
            table: self.grid.to_table(),
        }
    }
}

/// Horizontal run of cells that probably belonged to one merged cell in the PDF.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct MergedRegion {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

/// Reads the tables on the zero-based `page` of a layout document.
pub fn tables_for_page(document: &LayoutDocument, page: usize) -> Vec<LayoutTable> {
    let Some(layout_page) = document.page(page) else {
        return Vec::new();
    };

    markdown::split_loose_blocks(&layout_page.markdown)
        .into_iter()
        .map(Table::from_markdown_lines)
        .filter(|cells| !cells.is_empty())
        .map(|cells| LayoutTable {
            headers: cells.first().cloned().unwrap_or_default(),
            cells,
            page,
            bboxes: None,
        })
        .collect()
}

/// Reduces a table to a rectangular grid.
///
/// The header is the first row with any text; rows above it and blank data rows are dropped.
/// Every remaining row, header included, is padded to the widest row. Merged cells are detected
/// before any row is dropped.
pub fn normalize(table: &LayoutTable) -> NormalizedLayoutTable {
    let header_idx = table
        .cells
        .iter()
        .position(|row| !row.is_blank())
        .unwrap_or(0);
    let data_idxs: Vec<usize> = (header_idx + 1..table.cells.len())
        .filter(|&idx| !table.cells[idx].is_blank())
        .collect();

    // Raw row index of each grid row, header first.
    let kept: Vec<usize> = std::iter::once(header_idx)
        .chain(data_idxs.iter().copied())
        .collect();
    let merged_cells = detect_merged_cells(table)
        .into_iter()
        .filter_map(|region| {
            let row = kept.iter().position(|&idx| idx == region.row)?;
            Some(MergedRegion { row, ..region })
        })
        .collect();

    let header = table.cells.get(header_idx).cloned().unwrap_or_default();
    let data_rows: Vec<Row> = data_idxs
        .iter()
        .map(|&idx| table.cells[idx].clone())
        .collect();

    NormalizedLayoutTable {
        grid: Grid::padded(header, data_rows),
        page: table.page,
        bboxes: table.bboxes.clone(),
        merged_cells,
    }
}

/// Finds likely horizontal merges: each empty cell past the first column is attributed to the
/// nearest non-empty cell on its left. Advisory only, false positives are expected.
pub fn detect_merged_cells(table: &LayoutTable) -> Vec<MergedRegion> {
    let mut regions = Vec::new();
    for (row_idx, row) in table.cells.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate().skip(1) {
            if !cell.trim().is_empty() {
                continue;
            }
            if let Some(start) = (0..col_idx).rev().find(|&c| !row[c].trim().is_empty()) {
                regions.push(MergedRegion {
                    row: row_idx,
                    col: start,
                    row_span: 1,
                    col_span: col_idx - start + 1,
                });
            }
        }
    }
    regions
}

/// A layout document obtained for one document run.
#[derive(Debug)]
pub struct LayoutRun {
    pub document: LayoutDocument,
    pub from_cache: bool,
    /// Time spent in the model. Zero when served from cache.
    pub model_duration: Duration,
}

/// Runs a [LayoutModel] over whole documents, through an optional [cache::LayoutCache].
pub struct LayoutExtractor<M> {
    model: M,
    cache: Option<cache::LayoutCache>,
}

impl<M> LayoutExtractor<M>
where
    M: LayoutModel,
{
    pub fn new(model: M, cache: Option<cache::LayoutCache>) -> Self {
        Self { model, cache }
    }

    /// Returns the layout document for `pdf_path`, from cache if a valid entry exists.
    ///
    /// Unreadable cache entries are treated as misses. A failure to store a fresh result is
    /// logged and does not fail the call.
    pub fn load_document(&self, pdf_path: &Path) -> Result<LayoutRun> {
        if !pdf_path.exists() {
            return Err(PdfNotFound(pdf_path.to_owned()).into());
        }

        if let Some(cache) = &self.cache {
            match cache.load(pdf_path) {
                Ok(Some(document)) => {
                    log::info!("Using cached layout output for {:?}.", pdf_path);
                    return Ok(LayoutRun {
                        document,
                        from_cache: true,
                        model_duration: Duration::ZERO,
                    });
                }
                Ok(None) => {
                    log::debug!("No cached layout output for {:?}.", pdf_path);
                }
                Err(err) => {
                    log::warn!("Ignoring unreadable layout cache entry: {err:#}");
                }
            }
        }

        log::info!("Running layout model over {:?}.", pdf_path);
        let start = Instant::now();
        let document = self
            .model
            .convert(pdf_path)
            .with_context(|| format!("running layout model over {:?}", pdf_path))?;
        let model_duration = start.elapsed();
        log::info!(
            "Layout model produced {} page(s) in {:.1}s.",
            document.pages.len(),
            model_duration.as_secs_f64()
        );

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(pdf_path, &document) {
                log::warn!("Failed to store layout output in cache: {err:#}");
            }
        }

        Ok(LayoutRun {
            document,
            from_cache: false,
            model_duration,
        })
    }
}
