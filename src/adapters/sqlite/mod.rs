//! SQLite persistence for confidence histories.

pub mod connection;
pub mod history_store;
pub mod migrations;

pub use connection::{memory_pool, open_history_pool, ConnectionError};
pub use history_store::SqliteHistoryStore;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
