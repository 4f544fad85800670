//! Error types for sravana-ap
//!
//! Nothing in the playback subsystem is fatal to a session: media load
//! failures degrade to demo mode, storage failures are logged and retried
//! on the next checkpoint, and a missing audio device silences synthesis.

use thiserror::Error;

/// Failure writing to or reading from the progress store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Network/backend hiccup; the next checkpoint retries implicitly
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Main error type for sravana-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Shared library errors (model validation, config parsing)
    #[error(transparent)]
    Common(#[from] sravana_common::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Media source unreachable or undecodable (session falls back to demo mode)
    #[error("Media load error: {0}")]
    MediaLoad(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// No audio output available; synthesis becomes a no-op
    #[error("Audio context unavailable: {0}")]
    AudioContextUnavailable(String),

    /// Progress store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Command issued before a track was opened
    #[error("No track is open")]
    NoSession,

    /// Chapter jump to a chapter the track does not define
    #[error("Chapter not found: {0}")]
    ChapterNotFound(u32),

    /// Invalid request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using sravana-ap Error
pub type Result<T> = std::result::Result<T, Error>;
