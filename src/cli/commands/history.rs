//! `cadence history`: inspect persisted confidence histories.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::adapters::sqlite::SqliteHistoryStore;
use crate::cli::output::{list_table, output, score, CommandOutput};
use crate::domain::models::{Config, ConvergenceState, HistoryEntry};
use crate::domain::ports::HistoryStore;
use crate::services::ConvergenceDetector;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Entity to show; lists stored entities when omitted
    pub entity_id: Option<String>,

    /// Show at most this many of the most recent entries
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EntityListOutput {
    pub entities: Vec<String>,
}

impl CommandOutput for EntityListOutput {
    fn to_human(&self) -> String {
        if self.entities.is_empty() {
            return "No stored histories found.".to_string();
        }
        let mut lines = vec![format!("{} entit(ies) with history:", self.entities.len())];
        lines.extend(self.entities.iter().map(|id| format!("  {id}")));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryOutput {
    pub entity_id: String,
    pub total: usize,
    pub entries: Vec<HistoryEntry>,
    pub convergence: ConvergenceState,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return format!("No history stored for {}.", self.entity_id);
        }

        let mut table = list_table(&["iter", "score", "delta", "weights", "fallbacks", "scored at"]);
        for entry in &self.entries {
            table.add_row(vec![
                entry.iteration().to_string(),
                score(entry.overall()),
                format!("{:+.3}", entry.delta),
                format!("v{}", entry.result.weights_version),
                entry.result.fallbacks.len().to_string(),
                entry.result.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]);
        }

        let state = &self.convergence;
        [
            format!(
                "History for {} ({} of {} entries):",
                self.entity_id,
                self.entries.len(),
                self.total
            ),
            table.to_string(),
            String::new(),
            format!(
                "Convergence: {} ({}), confidence {}",
                state.status.as_str(),
                state.reason.as_str(),
                score(state.confidence_of_convergence)
            ),
        ]
        .join("\n")
    }
}

/// Load `entity_id` and analyze the full stored history.
pub async fn load_history(
    store: &dyn HistoryStore,
    config: &Config,
    entity_id: &str,
    limit: Option<usize>,
) -> Result<HistoryOutput> {
    let mut history = store
        .load(entity_id, config.tracker.history_capacity)
        .await
        .with_context(|| format!("Failed to load history for {entity_id}"))?;

    let detector = ConvergenceDetector::new(config.convergence.clone());
    let convergence = detector.analyze(history.as_slice());
    let total = history.len();
    let entries = history.tail(limit.unwrap_or(total));

    Ok(HistoryOutput {
        entity_id: entity_id.to_string(),
        total,
        entries,
        convergence,
    })
}

pub async fn execute(args: HistoryArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = SqliteHistoryStore::connect(&config.storage)
        .await
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;

    match args.entity_id {
        Some(entity_id) => {
            let result = load_history(&store, config, &entity_id, args.limit).await?;
            output(&result, json_mode);
        }
        None => {
            let entities = store.list_entities().await?;
            output(&EntityListOutput { entities }, json_mode);
        }
    }
    Ok(())
}
