//! Audio output and decoding
//!
//! - `context`: node graph, the `AudioContext` trait, lazy shared handle
//! - `output`: cpal-backed context
//! - `decoder`: symphonia file/stream decoding

pub mod context;
pub mod decoder;
pub mod output;

pub use context::{AudioContext, NodeId, OfflineContext, SharedAudioContext, Source};
pub use decoder::DecodedAudio;
pub use output::CpalContext;
