use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, bail};
use clap::Args;
use pipeline::schema::VINTAGES;
use simplelog::LevelFilter;

use super::ParserArgs;

/// Parses every `NECB-{vintage}.pdf` in a directory, each in its own worker process.
#[derive(Args, Debug)]
pub struct Command {
    /// Directory containing the PDFs.
    pdf_dir: PathBuf,

    /// Directory to write one `NECB-{vintage}.json` summary per document into.
    #[arg(long)]
    output_dir: PathBuf,

    /// Maximum number of documents to parse at once.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,

    #[command(flatten)]
    parser: ParserArgs,
}

/// A document found for one vintage.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Document {
    vintage: &'static str,
    pdf: PathBuf,
}

/// Runs the subcommand.
pub fn run(cmd: &Command, log_level: LevelFilter) -> Result<()> {
    let documents = find_documents(&cmd.pdf_dir);
    if documents.is_empty() {
        bail!("no NECB-<vintage>.pdf files found in {:?}", cmd.pdf_dir);
    }
    std::fs::create_dir_all(&cmd.output_dir)
        .with_context(|| format!("creating output directory {:?}", cmd.output_dir))?;

    let exe = std::env::current_exe().with_context(|| "locating current executable")?;
    let worker = Worker {
        exe: &exe,
        output_dir: &cmd.output_dir,
        log_level,
        parser_args: cmd.parser.to_args(),
    };

    let continue_intent = Arc::new(AtomicBool::new(true));
    {
        let continue_intent = continue_intent.clone();
        ctrlc::set_handler(move || continue_intent.store(false, Ordering::SeqCst))?;
    }

    let results = run_all(&documents, usize::from(cmd.jobs), &continue_intent, |document| {
        worker.run(document)
    });

    let mut failures = 0;
    for (document, result) in documents.iter().zip(&results) {
        match result {
            Some(Ok(status)) if status.success() => {
                eprintln!("NECB {}: done.", document.vintage);
            }
            Some(Ok(status)) => {
                failures += 1;
                eprintln!("NECB {}: worker exited with {}.", document.vintage, status);
            }
            Some(Err(err)) => {
                failures += 1;
                eprintln!("NECB {}: {:?}.", document.vintage, err);
            }
            None => {
                eprintln!("NECB {}: skipped, batch cancelled.", document.vintage);
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} document(s) failed", documents.len());
    }
    Ok(())
}

/// Documents for the known vintages present in `dir`. Missing vintages are warned about.
fn find_documents(dir: &Path) -> Vec<Document> {
    VINTAGES
        .iter()
        .filter_map(|&vintage| {
            let pdf = dir.join(format!("NECB-{vintage}.pdf"));
            if pdf.is_file() {
                Some(Document { vintage, pdf })
            } else {
                log::warn!("No PDF for NECB {vintage} at {:?}.", pdf);
                None
            }
        })
        .collect()
}

/// Runs `job` over `documents` on at most `jobs` threads, in order of the documents. Documents
/// not started before cancellation have no result.
fn run_all<T, F>(
    documents: &[Document],
    jobs: usize,
    continue_intent: &AtomicBool,
    job: F,
) -> Vec<Option<T>>
where
    T: Send,
    F: Fn(&Document) -> T + Sync,
{
    let next = Mutex::new(documents.iter().enumerate());
    let results: Mutex<Vec<Option<T>>> =
        Mutex::new(std::iter::repeat_with(|| None).take(documents.len()).collect());

    std::thread::scope(|scope| {
        for _ in 0..jobs.min(documents.len()) {
            scope.spawn(|| {
                loop {
                    if !continue_intent.load(Ordering::Relaxed) {
                        return;
                    }
                    let Some((index, document)) = next.lock().ok().and_then(|mut it| it.next())
                    else {
                        return;
                    };
                    let result = job(document);
                    if let Ok(mut results) = results.lock() {
                        results[index] = Some(result);
                    }
                }
            });
        }
    });

    results.into_inner().unwrap_or_default()
}

/// Starts `parse` workers from the current executable.
struct Worker<'a> {
    exe: &'a Path,
    output_dir: &'a Path,
    log_level: LevelFilter,
    parser_args: Vec<OsString>,
}

impl Worker<'_> {
    fn args(&self, document: &Document) -> Vec<OsString> {
        let output = self
            .output_dir
            .join(format!("NECB-{}.json", document.vintage));
        let mut args: Vec<OsString> = vec![
            "--log-level".into(),
            self.log_level.to_string().into(),
            "parse".into(),
            document.pdf.clone().into_os_string(),
            "--vintage".into(),
            document.vintage.into(),
            "--output".into(),
            output.into_os_string(),
            "--no-progress".into(),
        ];
        args.extend(self.parser_args.iter().cloned());
        args
    }

    fn run(&self, document: &Document) -> Result<ExitStatus> {
        log::info!("Starting worker for NECB {}.", document.vintage);
        std::process::Command::new(self.exe)
            .args(self.args(document))
            .status()
            .with_context(|| format!("running worker for {:?}", document.pdf))
    }
}
