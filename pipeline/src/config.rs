//! Parser configuration, read from YAML.

use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use extraction::{
    cleaner::LabelVocabulary, layout::command::LayoutCommand, validate::ValidationThresholds,
};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::hints::InstructionTable;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_temperature: f64,
    pub llm_timeout_secs: u64,
    pub thresholds: ValidationThresholds,
    pub layout_fallback_enabled: bool,
    pub cache_extractions: bool,
    /// Layout cache directory. The CLI uses the XDG cache directory when unset.
    pub cache_dir: Option<PathBuf>,
    pub layout_command: LayoutCommand,
    /// Tabula jar. The CLI looks next to its executable when unset.
    pub tabula_jar: Option<PathBuf>,
    /// Pdfium shared library, or a directory containing it. The system library is used when
    /// unset.
    pub pdfium_library: Option<PathBuf>,
    /// Keep the extracted table text on successful outcomes as well as failed ones.
    pub save_intermediate_results: bool,
    /// Repair instructions per table number, replacing the built-in ones.
    pub table_hints: HashMap<String, String>,
    /// Row labels the cleaner keeps, replacing the built-in assembly names.
    pub label_vocabulary: Option<LabelVocabulary>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            llm_model: "llama3.1:8b".to_owned(),
            llm_base_url: "http://localhost:11434".to_owned(),
            llm_temperature: 0.0,
            llm_timeout_secs: 30,
            thresholds: ValidationThresholds::default(),
            layout_fallback_enabled: true,
            cache_extractions: true,
            cache_dir: None,
            layout_command: LayoutCommand::default(),
            tabula_jar: None,
            pdfium_library: None,
            save_intermediate_results: false,
            table_hints: HashMap::new(),
            label_vocabulary: None,
        }
    }
}

impl ParserConfig {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn instruction_table(&self) -> InstructionTable {
        InstructionTable::new(&self.table_hints)
    }

    pub fn label_vocabulary(&self) -> LabelVocabulary {
        self.label_vocabulary.clone().unwrap_or_default()
    }
}

/// Loads the configuration at `path`, or the defaults when there is none.
pub fn load_config(path: Option<&Path>) -> Result<ParserConfig> {
    let Some(path) = path else {
        return Ok(ParserConfig::default());
    };
    let rdr = File::open(path).with_context(|| format!("opening configuration file {:?}", path))?;
    let config: ParserConfig =
        serde_yaml_ng::from_reader(rdr).with_context(|| "parsing configuration file")?;
    Ok(config)
}

#[cfg(test)]
impl testutils::DefaultForTest for ParserConfig {
    fn default_for_test() -> Self {
        Self {
            llm_timeout_secs: 1,
            cache_extractions: false,
            ..Default::default()
        }
    }
}
