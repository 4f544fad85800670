//! Shared gain stage
//!
//! The handle is cloned out to the engine so volume changes apply to a live
//! graph without reconnecting it.

use crate::audio::Source;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Lock-free gain value shared with the audio thread
#[derive(Debug, Clone)]
pub struct GainHandle(Arc<AtomicU32>);

impl GainHandle {
    pub fn new(gain: f32) -> Self {
        Self(Arc::new(AtomicU32::new(gain.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, gain: f32) {
        self.0.store(gain.to_bits(), Ordering::Relaxed);
    }
}

/// Multiplies an inner source by a shared gain
pub struct Gain<S> {
    inner: S,
    gain: GainHandle,
}

impl<S: Source> Gain<S> {
    pub fn new(inner: S, gain: GainHandle) -> Self {
        Self { inner, gain }
    }
}

impl<S: Source> Source for Gain<S> {
    fn next_sample(&mut self) -> Option<f32> {
        self.inner.next_sample().map(|s| s * self.gain.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::noise::LoopingBuffer;

    #[test]
    fn test_gain_changes_apply_live() {
        let handle = GainHandle::new(0.5);
        let mut node = Gain::new(LoopingBuffer::new(vec![1.0]), handle.clone());

        assert_eq!(node.next_sample(), Some(0.5));
        handle.set(0.25);
        assert_eq!(node.next_sample(), Some(0.25));
    }
}
