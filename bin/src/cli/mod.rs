use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pipeline::config::{ParserConfig, load_config};
use simplelog::LevelFilter;

use crate::distpaths;

mod batch;
mod parse;

/// Extracts requirement tables from NECB PDFs into validated JSON records.
#[derive(Parser)]
#[command(name = "codetables")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Logging level.
    #[arg(long, default_value = "Warn")]
    log_level: LevelFilter,
}

#[derive(Subcommand)]
enum Command {
    Parse(parse::Command),
    Batch(batch::Command),
}

/// Options shared by the subcommands that parse documents.
#[derive(ClapArgs, Clone, Debug, Default)]
struct ParserArgs {
    /// YAML configuration file. Defaults to `codetables.yaml` next to the executable, if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to cache layout model output in. Overrides the configuration.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl ParserArgs {
    fn load_config(&self) -> Result<ParserConfig> {
        let path = self.config.clone().or_else(distpaths::default_config);
        let mut config = load_config(path.as_deref())?;
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = Some(cache_dir.clone());
        }
        Ok(config)
    }

    /// Arguments that reproduce these options on a worker's command line.
    fn to_args(&self) -> Vec<std::ffi::OsString> {
        let mut args = Vec::new();
        if let Some(config) = &self.config {
            args.push("--config".into());
            args.push(config.clone().into_os_string());
        }
        if let Some(cache_dir) = &self.cache_dir {
            args.push("--cache-dir".into());
            args.push(cache_dir.clone().into_os_string());
        }
        args
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();

    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())
        .with_context(|| "configuring logging")?;

    let xdg_dirs = xdg::BaseDirectories::with_prefix("codetables");

    use Command::*;
    match &args.command {
        Parse(cmd) => parse::run(cmd, xdg_dirs),
        Batch(cmd) => batch::run(cmd, args.log_level),
    }
}
