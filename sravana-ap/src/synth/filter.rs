//! Resonant biquad filter (RBJ audio-EQ cookbook)
//!
//! `q_db` follows the browser convention for low/high-pass filters: the
//! resonance is given in decibels and converted to a linear Q.

use crate::audio::Source;
use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
}

/// Second-order IIR section, direct form I
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(kind: FilterKind, cutoff_hz: f32, q_db: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f64;
        let nyquist = sample_rate / 2.0;
        let cutoff = (cutoff_hz as f64).clamp(1.0, nyquist * 0.999);
        let q = 10f64.powf(q_db as f64 / 20.0);

        let w0 = TAU * cutoff / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterKind::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
        };
        let a0 = 1.0 + alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let x0 = input as f64;
        let y0 = self.b0 * x0 + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;

        y0 as f32
    }
}

/// Source passed through a biquad
pub struct Filtered<S> {
    inner: S,
    filter: Biquad,
}

impl<S: Source> Filtered<S> {
    pub fn new(inner: S, filter: Biquad) -> Self {
        Self { inner, filter }
    }
}

impl<S: Source> Source for Filtered<S> {
    fn next_sample(&mut self) -> Option<f32> {
        self.inner.next_sample().map(|s| self.filter.process(s))
    }
}
