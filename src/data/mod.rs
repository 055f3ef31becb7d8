//! Data layer module
//!
//! Handles all data persistence:
//! - `JokeStore` interface used by the services
//! - SQLite implementation
//! - In-memory implementation

mod database;
mod memory;
mod models;
mod store;

pub use database::Database;
pub use memory::MemoryStore;
pub use models::*;
pub use store::{JokeStore, ListMove, RandomRange, SaveOutcome};

#[cfg(test)]
mod database_test;
