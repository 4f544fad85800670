//! One-shot bell chime
//!
//! A sine whose gain decays exponentially from 0.3 to 0.001 over three
//! seconds, after which the source finishes and the context drops it.

use crate::audio::{NodeId, SharedAudioContext, Source};
use crate::synth::oscillator::SineOscillator;
use tracing::debug;

pub const CHIME_START_GAIN: f32 = 0.3;
pub const CHIME_END_GAIN: f32 = 0.001;
pub const CHIME_SECONDS: f32 = 3.0;

/// Decaying sine, finite
pub struct ChimeSource {
    oscillator: SineOscillator,
    gain: f64,
    decay: f64,
    remaining: u64,
}

impl ChimeSource {
    pub fn new(frequency_hz: f32, sample_rate: u32) -> Self {
        let total = (CHIME_SECONDS as f64 * sample_rate as f64).round().max(1.0);
        let ratio = CHIME_END_GAIN as f64 / CHIME_START_GAIN as f64;
        Self {
            oscillator: SineOscillator::new(frequency_hz, sample_rate),
            gain: CHIME_START_GAIN as f64,
            decay: ratio.powf(1.0 / total),
            remaining: total as u64,
        }
    }
}

impl Source for ChimeSource {
    fn next_sample(&mut self) -> Option<f32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let sample = self.oscillator.next_sample()? * self.gain as f32;
        self.gain *= self.decay;
        Some(sample)
    }
}

/// Rings a chime on the shared context
#[derive(Clone)]
pub struct BellChime {
    context: SharedAudioContext,
    frequency_hz: f32,
}

impl BellChime {
    pub fn new(context: SharedAudioContext, frequency_hz: f32) -> Self {
        Self {
            context,
            frequency_hz,
        }
    }

    /// Start one chime; `None` when no audio context is available
    pub fn ring(&self) -> Option<NodeId> {
        let context = self.context.get()?;
        let node = context.connect(Box::new(ChimeSource::new(
            self.frequency_hz,
            context.sample_rate(),
        )));
        debug!("Chime at {} Hz (node {})", self.frequency_hz, node);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioContext, OfflineContext};
    use std::sync::Arc;

    #[test]
    fn test_chime_lasts_three_seconds() {
        let sr = 1_000;
        let mut chime = ChimeSource::new(528.0, sr);
        let count = std::iter::from_fn(|| chime.next_sample()).count();
        assert_eq!(count, 3_000);
    }

    #[test]
    fn test_chime_gain_decays_to_end_level() {
        let mut chime = ChimeSource::new(528.0, 1_000);
        while chime.next_sample().is_some() {}
        assert!((chime.gain - CHIME_END_GAIN as f64).abs() < 1e-6);
    }

    #[test]
    fn test_ring_connects_and_self_removes() {
        let ctx = Arc::new(OfflineContext::new(1_000));
        let bell = BellChime::new(SharedAudioContext::with_context(ctx.clone()), 528.0);

        assert!(bell.ring().is_some());
        assert_eq!(ctx.connected_nodes().len(), 1);

        ctx.render(3_001);
        assert!(ctx.connected_nodes().is_empty());
    }

    #[test]
    fn test_ring_without_context_is_noop() {
        let bell = BellChime::new(SharedAudioContext::unavailable(), 528.0);
        assert!(bell.ring().is_none());
    }
}
