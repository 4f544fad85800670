//! # Sravana Common Library
//!
//! Shared code for the Sravana listening services:
//! - Track/chapter/progress domain model
//! - Event types (PlayerEvent enum) and the EventBus
//! - TOML bootstrap configuration loading
//! - Human-readable clock formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod models;

pub use error::{Error, Result};
pub use models::{Chapter, ProgressRecord, Track, UserIdentity};
