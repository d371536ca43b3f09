//! Runs whole documents through extraction, fallback and repair.

#[cfg(test)]
mod tests;

use std::{
    ops::Range,
    path::Path,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use extraction::{
    cleaner::{LabelVocabulary, clean_table},
    fast::{FastExtractor, PageMarkdownSource, PdfNotFound},
    layout::{
        LayoutExtractor, LayoutModel, LayoutRun, LayoutTable, MergedRegion, cache::LayoutCache,
        normalize, tables_for_page,
    },
    metadata::extract_table_identity,
    page::PageTextSource,
    table::RawTable,
    validate::{ValidationThresholds, validate},
};

use crate::{
    config::ParserConfig,
    model::LanguageModel,
    outcome::{DocumentParseSummary, ExtractionMethod, ParseOutcome, timing},
    prompt::RepairRequest,
    repair::{RepairEngine, RepairOutcome},
    schema::VINTAGES,
};

/// Parse event emitted to track progress.
#[derive(Debug)]
pub enum ParseEvent<'a> {
    /// A page has been fully processed.
    Progress {
        /// Zero-based page index.
        page: usize,
        completed: usize,
        total: usize,
    },
    /// A table outcome has been recorded.
    TableParsed(&'a ParseOutcome),
    /// If `terminal`, the run stops and the error is also returned by
    /// [DocumentParser::parse_document].
    Error {
        err: &'a anyhow::Error,
        terminal: bool,
    },
    /// The run has completed and no more events will follow.
    Completed,
    /// The run has been cancelled and no more events will follow.
    Cancelled,
}

/// Receives notifications about parse events, and may cancel the run between pages and tables.
pub trait ParseEvents {
    fn on_event(&mut self, event: ParseEvent<'_>);
    fn do_continue(&self) -> bool;
}

/// External services a [DocumentParser] runs on.
pub struct Collaborators<'a> {
    pub page_text: &'a dyn PageTextSource,
    pub fast_source: &'a dyn PageMarkdownSource,
    pub layout_model: &'a dyn LayoutModel,
    pub language_model: &'a dyn LanguageModel,
    pub layout_cache: Option<LayoutCache>,
}

/// Which document, and which part of it, to parse.
#[derive(Clone, Debug)]
pub struct DocumentRequest<'r> {
    pub pdf: &'r Path,
    pub vintage: &'r str,
    /// Zero-based page indices. Defaults to every page.
    pub pages: Option<Range<usize>>,
}

pub struct DocumentParser<'a> {
    page_text: &'a dyn PageTextSource,
    fast: FastExtractor<&'a dyn PageMarkdownSource>,
    layout: LayoutExtractor<&'a dyn LayoutModel>,
    repair: RepairEngine<&'a dyn LanguageModel>,
    thresholds: ValidationThresholds,
    vocabulary: LabelVocabulary,
    layout_fallback_enabled: bool,
    save_intermediate_results: bool,
}

/// State of one [DocumentParser::parse_document] call.
struct DocumentRun<'r> {
    request: &'r DocumentRequest<'r>,
    /// Loaded on first use, then shared by every page. Holds the failure message if loading
    /// failed, so that it is not retried.
    layout: Option<Result<LayoutRun, String>>,
    outcomes: Vec<ParseOutcome>,
    cancelled: bool,
}

impl DocumentRun<'_> {
    fn record(&mut self, outcome: ParseOutcome, events: &mut dyn ParseEvents) {
        log::debug!(
            "Table {} on page {}: {} ({}).",
            outcome.identity.number,
            outcome.identity.page + 1,
            if outcome.success() { "validated" } else { "failed" },
            outcome.method
        );
        self.outcomes.push(outcome);
        if let Some(outcome) = self.outcomes.last() {
            events.on_event(ParseEvent::TableParsed(outcome));
        }
    }

    /// Checks for cancellation, remembering it.
    fn do_continue(&mut self, events: &dyn ParseEvents) -> bool {
        if !self.cancelled && !events.do_continue() {
            self.cancelled = true;
        }
        !self.cancelled
    }
}

/// Stage timings shared by the outcomes of one page.
#[derive(Clone, Copy, Default)]
struct PageTiming {
    start: Option<Instant>,
    fast: Duration,
    layout: Option<Duration>,
    layout_model: Option<Duration>,
}

impl PageTiming {
    fn apply(&self, outcome: &mut ParseOutcome) {
        outcome.record_time(timing::FAST, self.fast);
        if let Some(layout) = self.layout {
            outcome.record_time(timing::LAYOUT, layout);
        }
        if let Some(layout_model) = self.layout_model {
            outcome.record_time(timing::LAYOUT_MODEL, layout_model);
        }
        if let Some(start) = self.start {
            outcome.record_time(timing::TOTAL, start.elapsed());
        }
    }
}

impl<'a> DocumentParser<'a> {
    pub fn new(collaborators: Collaborators<'a>, config: &ParserConfig) -> Self {
        Self {
            page_text: collaborators.page_text,
            fast: FastExtractor::new(collaborators.fast_source),
            layout: LayoutExtractor::new(collaborators.layout_model, collaborators.layout_cache),
            repair: RepairEngine::new(collaborators.language_model, config.instruction_table()),
            thresholds: config.thresholds,
            vocabulary: config.label_vocabulary(),
            layout_fallback_enabled: config.layout_fallback_enabled,
            save_intermediate_results: config.save_intermediate_results,
        }
    }

    /// Parses the requested pages of a document.
    ///
    /// Table-level failures become failed outcomes in the summary. Only problems that prevent any
    /// progress (missing PDF, unknown vintage, unreadable page count) are returned as errors.
    pub fn parse_document(
        &self,
        request: &DocumentRequest,
        events: &mut dyn ParseEvents,
    ) -> Result<DocumentParseSummary> {
        let start = Instant::now();

        let pages = match self.plan_pages(request) {
            Ok(pages) => pages,
            Err(err) => {
                events.on_event(ParseEvent::Error {
                    err: &err,
                    terminal: true,
                });
                return Err(err);
            }
        };
        log::info!(
            "Parsing pages {}..{} of {:?} as NECB {}.",
            pages.start + 1,
            pages.end,
            request.pdf,
            request.vintage
        );

        let mut run = DocumentRun {
            request,
            layout: None,
            outcomes: Vec::new(),
            cancelled: false,
        };
        let total = pages.len();
        let mut pages_processed = 0;

        for page in pages {
            if !run.do_continue(events) {
                break;
            }
            self.parse_page(&mut run, page, events);
            if run.cancelled {
                break;
            }
            pages_processed += 1;
            events.on_event(ParseEvent::Progress {
                page,
                completed: pages_processed,
                total,
            });
        }

        let summary = DocumentParseSummary::new(
            request.pdf.to_owned(),
            request.vintage.to_owned(),
            run.outcomes,
            start.elapsed(),
            pages_processed,
            run.cancelled,
        );
        log::info!(
            "Parsed {} table(s) from {} page(s) of {:?}, {:.0}% validated.",
            summary.outcomes.len(),
            summary.pages_processed,
            request.pdf,
            summary.success_rate * 100.0
        );

        if summary.cancelled {
            events.on_event(ParseEvent::Cancelled);
        } else {
            events.on_event(ParseEvent::Completed);
        }
        Ok(summary)
    }

    fn plan_pages(&self, request: &DocumentRequest) -> Result<Range<usize>> {
        if !VINTAGES.contains(&request.vintage) {
            return Err(anyhow!(
                "unknown vintage {:?}, expected one of {}",
                request.vintage,
                VINTAGES.join(", ")
            ));
        }
        if !request.pdf.exists() {
            return Err(PdfNotFound(request.pdf.to_owned()).into());
        }

        let page_count = self
            .page_text
            .page_count(request.pdf)
            .with_context(|| format!("counting pages of {:?}", request.pdf))?;
        let pages = request.pages.clone().unwrap_or(0..page_count);
        Ok(pages.start.min(page_count)..pages.end.min(page_count))
    }

    fn parse_page(
        &self,
        run: &mut DocumentRun,
        page: usize,
        events: &mut dyn ParseEvents,
    ) {
        let pdf = run.request.pdf;
        let mut page_timing = PageTiming {
            start: Some(Instant::now()),
            ..Default::default()
        };

        let page_text = match self.page_text.page_text(pdf, page) {
            Ok(text) => text,
            Err(err) => {
                let err = err.context(format!("reading text of page {}", page + 1));
                log::warn!("{err:#}");
                events.on_event(ParseEvent::Error {
                    err: &err,
                    terminal: false,
                });
                String::new()
            }
        };

        let fast_start = Instant::now();
        let mut validation_errors = Vec::new();
        let blocks = match self.fast.extract_tables_from_page(pdf, page) {
            Ok(blocks) => blocks,
            Err(err) => {
                let err = err.context(format!("fast extraction of page {}", page + 1));
                log::warn!("{err:#}");
                events.on_event(ParseEvent::Error {
                    err: &err,
                    terminal: false,
                });
                validation_errors.push(format!("Fast extraction failed: {err:#}"));
                Vec::new()
            }
        };
        let mut passed = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            let validation = validate(block, &self.thresholds);
            for warning in validation.warnings() {
                log::debug!("Page {} block {index}: {warning}", page + 1);
            }
            if validation.passed() {
                passed.push((index, block.to_raw_table()));
            } else {
                validation_errors.extend(validation.into_errors());
            }
        }
        page_timing.fast = fast_start.elapsed();

        if !passed.is_empty() {
            for (index, raw) in passed {
                if !run.do_continue(events) {
                    return;
                }
                let mut outcome = self.repair_table(
                    run.request.vintage,
                    &raw,
                    &page_text,
                    index,
                    ExtractionMethod::Fast,
                    &[],
                );
                page_timing.apply(&mut outcome);
                run.record(outcome, events);
            }
            return;
        }

        if !self.layout_fallback_enabled {
            if !validation_errors.is_empty() {
                let mut outcome = self.structural_failure(&page_text, page, validation_errors);
                page_timing.apply(&mut outcome);
                run.record(outcome, events);
            }
            return;
        }

        if !blocks.is_empty() {
            log::info!(
                "No fast block on page {} passed validation, falling back to layout extraction.",
                page + 1
            );
        }
        let layout_start = Instant::now();
        let layout_tables = self.layout_tables(run, page, &mut page_timing, events);
        page_timing.layout = Some(layout_start.elapsed());

        match layout_tables {
            Ok(tables) if !tables.is_empty() => {
                for (index, table) in tables.iter().enumerate() {
                    if !run.do_continue(events) {
                        return;
                    }
                    let normalized = normalize(table);
                    let mut outcome = self.repair_table(
                        run.request.vintage,
                        &normalized.to_raw_table(),
                        &page_text,
                        index,
                        ExtractionMethod::Layout,
                        &normalized.merged_cells,
                    );
                    page_timing.apply(&mut outcome);
                    run.record(outcome, events);
                }
            }
            Ok(_) => {
                if !validation_errors.is_empty() {
                    let mut outcome = self.structural_failure(&page_text, page, validation_errors);
                    page_timing.apply(&mut outcome);
                    run.record(outcome, events);
                }
            }
            Err(LayoutUnavailable {
                message,
                first_failure,
            }) => {
                if first_failure || !validation_errors.is_empty() {
                    validation_errors.push(message);
                    let mut outcome = self.structural_failure(&page_text, page, validation_errors);
                    page_timing.apply(&mut outcome);
                    run.record(outcome, events);
                }
            }
        }
    }

    /// Tables of `page` from the document's layout run, loading the run on first use.
    fn layout_tables(
        &self,
        run: &mut DocumentRun,
        page: usize,
        page_timing: &mut PageTiming,
        events: &mut dyn ParseEvents,
    ) -> Result<Vec<LayoutTable>, LayoutUnavailable> {
        let pdf = run.request.pdf;
        let mut loaded_now = false;
        let layout = run.layout.get_or_insert_with(|| {
            loaded_now = true;
            match self.layout.load_document(pdf) {
                Ok(layout_run) => Ok(layout_run),
                Err(err) => {
                    log::warn!(
                        "Layout extraction of {:?} failed, continuing without it: {err:#}",
                        pdf
                    );
                    events.on_event(ParseEvent::Error {
                        err: &err,
                        terminal: false,
                    });
                    Err(format!("Layout extraction failed: {err:#}"))
                }
            }
        });

        match layout {
            Ok(layout_run) => {
                if loaded_now {
                    page_timing.layout_model = Some(layout_run.model_duration);
                }
                Ok(tables_for_page(&layout_run.document, page))
            }
            Err(message) => Err(LayoutUnavailable {
                message: message.clone(),
                first_failure: loaded_now,
            }),
        }
    }

    /// Cleans one table, identifies it and has it repaired into a record. `merged_cells` are
    /// indexed by the rows of `raw`.
    fn repair_table(
        &self,
        vintage: &str,
        raw: &RawTable,
        page_text: &str,
        index: usize,
        method: ExtractionMethod,
        merged_cells: &[MergedRegion],
    ) -> ParseOutcome {
        let identity = extract_table_identity(page_text, raw.page, index);
        let cleaned = clean_table(raw, &self.vocabulary);
        let table_text = cleaned.to_markdown();

        if cleaned.is_empty() {
            let mut outcome =
                ParseOutcome::failed(identity, vec!["Table has no rows after cleaning".to_owned()]);
            outcome.raw_extraction = Some(table_text);
            return outcome;
        }

        let merged_cells: Vec<MergedRegion> = merged_cells
            .iter()
            .filter_map(|region| {
                let row = cleaned.rendered_row(region.row)?;
                Some(MergedRegion { row, ..*region })
            })
            .collect();

        let llm_start = Instant::now();
        let attempt = self.repair.repair(&RepairRequest {
            raw_table: &table_text,
            table_number: &identity.number,
            vintage,
            merged_cells: &merged_cells,
        });
        let llm_elapsed = llm_start.elapsed();

        let mut outcome = match attempt.outcome {
            RepairOutcome::Validated(record) => {
                let mut outcome = ParseOutcome::validated(identity, record, method);
                if self.save_intermediate_results {
                    outcome.raw_extraction = Some(table_text);
                }
                outcome
            }
            RepairOutcome::Rejected(rejection) => {
                log::warn!(
                    "Rejected table {} on page {}: {}",
                    identity.number,
                    identity.page + 1,
                    rejection.reasons().join("; ")
                );
                let mut outcome = ParseOutcome::failed(identity, rejection.into_reasons());
                outcome.llm_applied = attempt.model_called;
                outcome.raw_extraction = Some(table_text);
                outcome
            }
        };
        if attempt.model_called {
            outcome.record_time(timing::LLM, llm_elapsed);
        }
        outcome
    }

    /// Failed outcome for a page whose tables could not be extracted at all.
    fn structural_failure(&self, page_text: &str, page: usize, errors: Vec<String>) -> ParseOutcome {
        ParseOutcome::failed(extract_table_identity(page_text, page, 0), errors)
    }
}

struct LayoutUnavailable {
    message: String,
    /// Set on the call that attempted the load.
    first_failure: bool,
}
