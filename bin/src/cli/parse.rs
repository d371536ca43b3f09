use std::{
    ops::Range,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, anyhow};
use atomic_write_file::AtomicWriteFile;
use clap::Args;
use extraction::{
    fast::tabulasource::TabulaMarkdownSource,
    layout::{cache::LayoutCache, command::CommandLayoutModel},
    page::PdfiumTextSource,
};
use pipeline::{
    config::ParserConfig,
    model::ollama::OllamaClient,
    orchestrator::{Collaborators, DocumentParser, DocumentRequest, ParseEvent, ParseEvents},
    outcome::DocumentParseSummary,
    schema::VINTAGES,
};
use simple_bar::ProgressBar;

use super::ParserArgs;
use crate::distpaths;

/// Parses the requirement tables of one NECB PDF and writes a JSON summary.
#[derive(Args, Debug)]
pub struct Command {
    /// Path to input PDF.
    input_pdf: PathBuf,

    /// Edition of the code that the PDF contains.
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(VINTAGES))]
    vintage: String,

    /// Path to write the JSON summary to. Replaced atomically.
    #[arg(long)]
    output: PathBuf,

    #[command(flatten)]
    parser: ParserArgs,

    /// Only parse these zero-based pages, given as `START..END` (end exclusive).
    #[arg(long, value_parser = parse_page_range)]
    pages: Option<Range<usize>>,

    /// Do not show a progress bar.
    #[arg(long, default_value = "false")]
    no_progress: bool,
}

/// Runs the subcommand.
pub fn run(cmd: &Command, xdg_dirs: xdg::BaseDirectories) -> Result<()> {
    let config = cmd.parser.load_config()?;

    let page_text = PdfiumTextSource::new(config.pdfium_library.as_deref())?;
    let tabula_jar = config
        .tabula_jar
        .clone()
        .or_else(distpaths::tabula_jar)
        .ok_or_else(|| anyhow!("no Tabula jar configured, set tabula_jar in the configuration"))?;
    let fast_source = TabulaMarkdownSource::new(&tabula_jar)?;
    let layout_model = CommandLayoutModel::new(config.layout_command.clone());
    let language_model = OllamaClient::new(
        &config.llm_base_url,
        &config.llm_model,
        config.llm_temperature,
        config.llm_timeout(),
    );

    let parser = DocumentParser::new(
        Collaborators {
            page_text: &page_text,
            fast_source: &fast_source,
            layout_model: &layout_model,
            language_model: &language_model,
            layout_cache: open_cache(&config, &xdg_dirs)?,
        },
        &config,
    );

    let request = DocumentRequest {
        pdf: &cmd.input_pdf,
        vintage: &cmd.vintage,
        pages: cmd.pages.clone(),
    };

    let continue_intent = Arc::new(AtomicBool::new(true));
    let mut events = EventDisplayer::new(!cmd.no_progress, continue_intent.clone());
    ctrlc::set_handler(move || continue_intent.store(false, Ordering::SeqCst))?;

    let summary = parser.parse_document(&request, &mut events)?;
    write_summary(&cmd.output, &summary)?;

    eprintln!(
        "{} of {} table(s) validated, summary written to {:?}.",
        summary.successes().count(),
        summary.outcomes.len(),
        cmd.output
    );
    Ok(())
}

fn open_cache(
    config: &ParserConfig,
    xdg_dirs: &xdg::BaseDirectories,
) -> Result<Option<LayoutCache>> {
    if !config.cache_extractions {
        return Ok(None);
    }
    let dir = match &config.cache_dir {
        Some(dir) => dir.clone(),
        None => xdg_dirs
            .create_cache_directory("layout")
            .with_context(|| "creating layout cache directory")?,
    };
    LayoutCache::new(dir).map(Some)
}

fn write_summary(path: &Path, summary: &DocumentParseSummary) -> Result<()> {
    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("opening file {:?} to write summary", path))?;
    serde_json::to_writer_pretty(&mut file, summary)
        .with_context(|| format!("writing summary as JSON to file {:?}", path))?;
    file.commit()
        .with_context(|| format!("committing summary file {:?}", path))?;
    Ok(())
}

fn parse_page_range(value: &str) -> Result<Range<usize>> {
    let (start, end) = value
        .split_once("..")
        .ok_or_else(|| anyhow!("expected START..END, got {value:?}"))?;
    let start: usize = start
        .trim()
        .parse()
        .with_context(|| format!("parsing range start {start:?}"))?;
    let end: usize = end
        .trim()
        .parse()
        .with_context(|| format!("parsing range end {end:?}"))?;
    if start >= end {
        return Err(anyhow!("page range {value:?} is empty"));
    }
    Ok(start..end)
}

struct EventDisplayer {
    show_progress: bool,
    progress_bar: Option<ProgressBar>,
    continue_intent: Arc<AtomicBool>,
}

impl EventDisplayer {
    fn new(show_progress: bool, continue_intent: Arc<AtomicBool>) -> Self {
        EventDisplayer {
            show_progress,
            progress_bar: None,
            continue_intent,
        }
    }
}

impl ParseEvents for EventDisplayer {
    fn on_event(&mut self, event: ParseEvent<'_>) {
        match event {
            ParseEvent::Progress { total, .. } => {
                if !self.show_progress {
                    return;
                }
                let total = u32::try_from(total).unwrap_or(u32::MAX);
                self.progress_bar
                    .get_or_insert_with(|| ProgressBar::cargo_style(total, 80, true))
                    .update();
            }
            ParseEvent::TableParsed(outcome) => {
                if !outcome.success() {
                    log::info!(
                        "{} (page {}) failed: {}",
                        outcome.identity.number,
                        outcome.identity.page + 1,
                        outcome.errors.join("; ")
                    );
                }
            }
            ParseEvent::Error {
                err,
                terminal: false,
            } => {
                eprintln!("Error (continuing): {:?}.", err);
            }
            ParseEvent::Error {
                err,
                terminal: true,
            } => {
                eprintln!("Parsing failed: {:?}.", err);
            }
            ParseEvent::Completed => {
                eprintln!("Parsing complete.");
            }
            ParseEvent::Cancelled => {
                eprintln!("Parsing cancelled.");
            }
        }
    }

    fn do_continue(&self) -> bool {
        self.continue_intent.load(Ordering::Relaxed)
    }
}
