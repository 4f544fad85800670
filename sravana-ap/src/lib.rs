//! # Sravana Audio Player Library (sravana-ap)
//!
//! Long-form chaptered audio playback with procedural ambient sound.
//!
//! **Purpose:** Drive audiobook playback through a transport state machine,
//! derive the current chapter from elapsed time, checkpoint listening
//! progress, run the sleep timer, and synthesize ambient background sound.
//!
//! **Architecture:** symphonia decoding + a small node graph rendered by cpal,
//! tokio tasks for every timer-driven side effect, axum HTTP/SSE control API.

pub mod api;
pub mod audio;
pub mod config;
pub mod db;
pub mod error;
pub mod input;
pub mod playback;
pub mod synth;

pub use error::{Error, Result};
pub use playback::Player;
