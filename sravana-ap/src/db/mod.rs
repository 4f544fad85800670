//! Listening-progress persistence
//!
//! - `init`: SQLite pool setup and schema
//! - `progress`: the `ProgressStore` trait and its SQLite/in-memory backends

pub mod init;
pub mod progress;

pub use init::init_database;
pub use progress::{MemoryProgressStore, ProgressStore, SqliteProgressStore};
