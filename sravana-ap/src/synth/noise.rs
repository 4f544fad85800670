//! Shaped noise buffers for nature ambiences
//!
//! Each color fills a two-second buffer once; playback loops it.

use crate::audio::Source;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Length of a generated noise buffer
pub const NOISE_BUFFER_SECONDS: u32 = 2;

/// Nature ambience texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    Rain,
    Ocean,
    Forest,
}

impl NoiseColor {
    /// Shape sample `index` of white noise `white` (uniform in [-1, 1))
    ///
    /// `gate` is a second uniform draw in [0, 1), used only by rain.
    fn shape(self, white: f32, gate: f32, index: usize, sample_rate: u32) -> f32 {
        match self {
            NoiseColor::Rain => white * if gate > 0.7 { 1.0 } else { 0.3 },
            NoiseColor::Ocean => {
                let swell = (index as f64 / (sample_rate as f64 / 0.1)).sin() as f32;
                white * 0.5 + 0.5 * swell
            }
            NoiseColor::Forest => white * 0.3,
        }
    }
}

/// Generate a two-second buffer of shaped noise
pub fn generate_noise_buffer<R: Rng>(
    color: NoiseColor,
    sample_rate: u32,
    rng: &mut R,
) -> Vec<f32> {
    let len = (sample_rate * NOISE_BUFFER_SECONDS) as usize;
    (0..len)
        .map(|i| {
            let white: f32 = rng.gen_range(-1.0..1.0);
            let gate = if color == NoiseColor::Rain { rng.gen::<f32>() } else { 0.0 };
            color.shape(white, gate, i, sample_rate)
        })
        .collect()
}

/// Endless playback of a fixed buffer
pub struct LoopingBuffer {
    samples: Arc<[f32]>,
    position: usize,
}

impl LoopingBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
            position: 0,
        }
    }
}

impl Source for LoopingBuffer {
    fn next_sample(&mut self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sample = self.samples[self.position];
        self.position = (self.position + 1) % self.samples.len();
        Some(sample)
    }
}
