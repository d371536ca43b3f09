use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use super::{LayoutDocument, LayoutModel};

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";
const STDERR_TAIL_CHARS: usize = 2000;

/// External layout converter invocation. `{input}` and `{output_dir}` in `args` are replaced with
/// the PDF path and a scratch output directory.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LayoutCommand {
    fn default() -> Self {
        Self {
            program: "marker_single".to_owned(),
            args: [
                INPUT_PLACEHOLDER,
                "--output_dir",
                OUTPUT_DIR_PLACEHOLDER,
                "--output_format",
                "markdown",
                "--paginate_output",
                "--disable_image_extraction",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

impl LayoutCommand {
    fn expand_args(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.as_os_str().to_owned(),
                OUTPUT_DIR_PLACEHOLDER => output_dir.as_os_str().to_owned(),
                other => OsString::from(
                    other
                        .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                        .replace(OUTPUT_DIR_PLACEHOLDER, &output_dir.to_string_lossy()),
                ),
            })
            .collect()
    }
}

/// [LayoutModel] that runs a Marker-compatible converter as a child process and reads back the
/// paginated markdown it writes.
pub struct CommandLayoutModel {
    command: LayoutCommand,
}

impl CommandLayoutModel {
    pub fn new(command: LayoutCommand) -> Self {
        Self { command }
    }
}

impl LayoutModel for CommandLayoutModel {
    fn convert(&self, pdf_path: &Path) -> Result<LayoutDocument> {
        let output_dir = tempfile::tempdir().with_context(|| "creating layout output directory")?;
        let args = self.command.expand_args(pdf_path, output_dir.path());

        log::debug!("Running {:?} with {:?}.", self.command.program, args);
        let output = Command::new(&self.command.program)
            .args(&args)
            .output()
            .with_context(|| format!("starting layout command {:?}", self.command.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
            let tail: String = stderr.chars().skip(skip).collect();
            bail!(
                "layout command {:?} failed with {}: {}",
                self.command.program,
                output.status,
                tail.trim()
            );
        }

        let markdown_path = find_output_file(output_dir.path(), |path| {
            path.extension().is_some_and(|ext| ext == "md")
        })?
        .ok_or_else(|| anyhow!("layout command wrote no markdown file"))?;
        let markdown = std::fs::read_to_string(&markdown_path)
            .with_context(|| format!("reading layout output {:?}", markdown_path))?;

        let metadata = read_metadata(output_dir.path());

        Ok(LayoutDocument::from_paginated_markdown(&markdown, metadata))
    }
}

/// First file (in path order) below `dir` accepted by `pred`.
fn find_output_file(dir: &Path, pred: impl Fn(&Path) -> bool) -> Result<Option<PathBuf>> {
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("listing layout output in {:?}", dir))?;
        if entry.file_type().is_file() && pred(entry.path()) {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

/// Metadata the converter writes next to the markdown as `*_meta.json`, if any.
fn read_metadata(dir: &Path) -> serde_json::Map<String, serde_json::Value> {
    let meta_path = match find_output_file(dir, |path| {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with("_meta.json"))
    }) {
        Ok(Some(meta_path)) => meta_path,
        Ok(None) => return serde_json::Map::new(),
        Err(err) => {
            log::debug!("Could not look for layout metadata: {err:#}");
            return serde_json::Map::new();
        }
    };

    let parsed = std::fs::read(&meta_path)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| Ok(serde_json::from_slice(&bytes)?));
    match parsed {
        Ok(metadata) => metadata,
        Err(err) => {
            log::debug!("Ignoring unreadable layout metadata {:?}: {err:#}", meta_path);
            serde_json::Map::new()
        }
    }
}
