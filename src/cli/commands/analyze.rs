//! `cadence analyze`: score a JSONL file of analysis requests.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::cli::output::{list_table, output, score, truncate, CommandOutput};
use crate::cli::open_store;
use crate::domain::errors::DomainError;
use crate::domain::models::{AnalysisRequest, Config, JobId, JobRecord, ShadowMetrics};
use crate::services::Orchestrator;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// JSONL file with one analysis request per line
    pub input: PathBuf,

    /// Run the whole file this many times, one pass after another
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub passes: u32,
}

/// A line that could not be turned into a job.
#[derive(Debug, Serialize)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct JobRow {
    pub pass: u32,
    pub job_id: String,
    pub entity_id: String,
    pub status: String,
    pub overall: Option<f64>,
    pub iteration: Option<u64>,
    pub convergence: Option<String>,
    pub shadow_divergence: Option<f64>,
    pub fallbacks: usize,
    pub error: Option<String>,
}

impl JobRow {
    fn from_record(pass: u32, record: &JobRecord) -> Self {
        let result = record.result.as_ref();
        Self {
            pass,
            job_id: record.id.to_string(),
            entity_id: record.entity_id.clone(),
            status: record.status.to_string(),
            overall: result.map(|r| r.confidence.overall),
            iteration: result.map(|r| r.confidence.iteration),
            convergence: result.map(|r| {
                format!("{} ({})", r.convergence.status.as_str(), r.convergence.reason.as_str())
            }),
            shadow_divergence: result
                .and_then(|r| r.shadow.as_ref())
                .and_then(|s| s.comparison.as_ref())
                .map(|c| c.divergence),
            fallbacks: result.map_or(0, |r| r.confidence.fallbacks.len()),
            error: record.error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub jobs: Vec<JobRow>,
    pub skipped: Vec<SkippedLine>,
    pub shadow: ShadowMetrics,
    pub weights_version: u64,
}

impl CommandOutput for AnalyzeOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();

        if self.jobs.is_empty() {
            lines.push("No jobs were run.".to_string());
        } else {
            let mut table = list_table(&[
                "pass", "entity", "status", "score", "iter", "convergence", "shadow", "fallbacks",
            ]);
            for job in &self.jobs {
                table.add_row(vec![
                    job.pass.to_string(),
                    truncate(&job.entity_id, 32),
                    job.status.clone(),
                    job.overall.map_or_else(|| "-".to_string(), score),
                    job.iteration.map_or_else(|| "-".to_string(), |i| i.to_string()),
                    job.convergence.clone().unwrap_or_else(|| {
                        job.error.as_deref().map_or_else(|| "-".to_string(), |e| truncate(e, 40))
                    }),
                    job.shadow_divergence.map_or_else(|| "-".to_string(), score),
                    job.fallbacks.to_string(),
                ]);
            }
            lines.push(format!("{} job(s):", self.jobs.len()));
            lines.push(table.to_string());
        }

        for skipped in &self.skipped {
            lines.push(format!("Skipped line {}: {}", skipped.line, skipped.reason));
        }

        let shadow = &self.shadow;
        lines.push(String::new());
        lines.push(format!(
            "Shadow: breaker {}, {} sampled, {} skipped, mean divergence {}, mean agreement {}",
            shadow.breaker.as_str(),
            shadow.total_sampled,
            shadow.total_skipped,
            score(shadow.mean_divergence),
            score(shadow.mean_agreement),
        ));
        if shadow.alerts_raised > 0 {
            lines.push(format!("Divergence alerts raised: {}", shadow.alerts_raised));
        }

        lines.join("\n")
    }
}

/// Parse JSONL requests with their 1-based line numbers, reporting lines
/// that fail to parse.
pub fn parse_requests(contents: &str) -> (Vec<(usize, AnalysisRequest)>, Vec<SkippedLine>) {
    let mut requests = Vec::new();
    let mut skipped = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<AnalysisRequest>(trimmed) {
            Ok(request) => requests.push((idx + 1, request)),
            Err(err) => skipped.push(SkippedLine {
                line: idx + 1,
                reason: err.to_string(),
            }),
        }
    }

    (requests, skipped)
}

pub async fn execute(args: AnalyzeArgs, config: Config, json_mode: bool) -> Result<()> {
    let result = run(&args.input, args.passes, config).await?;
    output(&result, json_mode);
    Ok(())
}

/// Run every request through a fresh orchestrator `passes` times.
pub async fn run(input: &Path, passes: u32, config: Config) -> Result<AnalyzeOutput> {
    let contents = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let (requests, mut skipped) = parse_requests(&contents);
    tracing::info!(
        requests = requests.len(),
        skipped = skipped.len(),
        passes,
        "Analyzing requests"
    );

    let store = open_store(&config).await?;
    let orchestrator = Orchestrator::builder(config).with_store(store).start();

    let mut jobs = Vec::new();
    for pass in 1..=passes {
        let mut pending: VecDeque<JobId> = VecDeque::new();
        for (line, request) in &requests {
            loop {
                match orchestrator.submit(request.clone()) {
                    Ok(id) => {
                        pending.push_back(id);
                        break;
                    }
                    // Full queue: wait for the oldest outstanding job, then retry.
                    Err(DomainError::QueueFull { .. }) if !pending.is_empty() => {
                        if let Some(id) = pending.pop_front() {
                            let record = orchestrator.wait(id).await?;
                            jobs.push(JobRow::from_record(pass, &record));
                        }
                    }
                    Err(err) => {
                        skipped.push(SkippedLine {
                            line: *line,
                            reason: format!("{} (pass {pass}): {err}", request.entity_id()),
                        });
                        break;
                    }
                }
            }
        }

        for id in pending {
            let record = orchestrator.wait(id).await?;
            jobs.push(JobRow::from_record(pass, &record));
        }
    }

    let shadow = orchestrator.shadow_metrics();
    let weights_version = orchestrator.weights().version;
    orchestrator.shutdown().await;

    Ok(AnalyzeOutput {
        jobs,
        skipped,
        shadow,
        weights_version,
    })
}
