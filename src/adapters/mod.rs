//! Adapters for external systems.

pub mod sqlite;
