//! Procedural sound synthesis
//!
//! The only place oscillator and noise sources are constructed. Ambient
//! profiles and the bell chime are both built here from the same primitives.

pub mod ambient;
pub mod chime;
pub mod filter;
pub mod gain;
pub mod noise;
pub mod oscillator;

pub use ambient::{AmbientEngine, AmbientKind, AmbientProfile, InstrumentStyle};
pub use chime::BellChime;
pub use noise::NoiseColor;
