//! Sine oscillator

use crate::audio::Source;
use std::f64::consts::TAU;

/// Phase-accumulating sine oscillator at unit amplitude
#[derive(Debug, Clone)]
pub struct SineOscillator {
    phase: f64,
    phase_increment: f64,
}

impl SineOscillator {
    pub fn new(frequency_hz: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f64;
        Self {
            phase: 0.0,
            phase_increment: frequency_hz as f64 / sample_rate,
        }
    }
}

impl Source for SineOscillator {
    fn next_sample(&mut self) -> Option<f32> {
        let sample = (self.phase * TAU).sin() as f32;
        self.phase = (self.phase + self.phase_increment).fract();
        Some(sample)
    }
}
