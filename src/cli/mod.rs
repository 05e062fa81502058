//! Command-line interface for the `cadence` binary.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::sqlite::SqliteHistoryStore;
use crate::domain::models::{Config, StorageBackend};
use crate::domain::ports::{HistoryStore, InMemoryHistoryStore};
use crate::infrastructure::config::ConfigLoader;

#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Cadence - confidence scoring and convergence engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .cadence/config.yaml plus CADENCE_* overrides)
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score a JSONL file of analysis requests
    Analyze(commands::analyze::AnalyzeArgs),

    /// Show persisted confidence history
    History(commands::history::HistoryArgs),

    /// Print the effective configuration
    Config(commands::config::ConfigArgs),
}

/// Load configuration from `path`, or through the layered defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the configured history store.
pub async fn open_store(config: &Config) -> Result<Arc<dyn HistoryStore>> {
    Ok(match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryHistoryStore::new()),
        StorageBackend::Sqlite => Arc::new(SqliteHistoryStore::connect(&config.storage).await?),
    })
}

/// Print `err` and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
