//! Cadence - confidence scoring and convergence engine
//!
//! Cadence scores entities along several dimensions, tracks how each
//! entity's confidence evolves across repeated analyses, decides when that
//! confidence has converged, and compares the results against a baseline
//! system in shadow mode before they are trusted.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): scorer, tracker, convergence detector,
//!   shadow controller and the orchestrator that drives them
//! - **Adapters** (`adapters`): SQLite history persistence
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use cadence::domain::models::{AnalysisInput, AnalysisRequest, Config};
//! use cadence::services::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::start(Config::default());
//!     let input = AnalysisInput::new("doc-1", "Some content to score");
//!     let job = orchestrator.submit(AnalysisRequest::new(input).with_baseline(0.7))?;
//!     let record = orchestrator.wait(job).await?;
//!     println!("{:?}", record.status);
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use services::Orchestrator;
