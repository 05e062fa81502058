//! Domain layer for the Cadence scoring engine
//!
//! This module contains the core data model, error taxonomy and the port
//! traits that external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult};
