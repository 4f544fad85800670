//! Ambient sound engine
//!
//! Builds one procedural graph per selected profile:
//!
//! - Frequency: sine oscillator -> gain
//! - Nature: looping shaped-noise buffer -> biquad -> gain
//! - Instrument: sine at the instrument's reference pitch -> gain
//!
//! The engine knows nothing about playback; the follower in
//! `playback::ambient_follower` decides when it should sound.

use crate::audio::{NodeId, SharedAudioContext, Source};
use crate::error::{Error, Result};
use crate::synth::filter::{Biquad, Filtered, FilterKind};
use crate::synth::gain::{Gain, GainHandle};
use crate::synth::noise::{generate_noise_buffer, LoopingBuffer, NoiseColor};
use crate::synth::oscillator::SineOscillator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Filter resonance for nature ambiences (dB)
const NATURE_FILTER_Q_DB: f32 = 1.0;
const RAIN_HIGHPASS_HZ: f32 = 1000.0;
const NATURE_LOWPASS_HZ: f32 = 800.0;

/// Tonal instrument drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentStyle {
    SingingBowl,
    Bell,
}

impl InstrumentStyle {
    /// Reference pitch of the drone
    pub fn reference_hz(self) -> f32 {
        match self {
            InstrumentStyle::SingingBowl => 220.0,
            InstrumentStyle::Bell => 880.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmbientKind {
    Frequency { hz: f32 },
    Nature { color: NoiseColor },
    Instrument { style: InstrumentStyle },
}

/// Named procedural-sound configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientProfile {
    pub id: String,
    pub name: String,
    pub kind: AmbientKind,
}

impl AmbientProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AmbientKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    /// Stock profiles
    pub fn catalog() -> Vec<AmbientProfile> {
        use AmbientKind::*;
        vec![
            Self::new("tone-174", "174 Hz tone", Frequency { hz: 174.0 }),
            Self::new("tone-396", "396 Hz tone", Frequency { hz: 396.0 }),
            Self::new("tone-432", "432 Hz tone", Frequency { hz: 432.0 }),
            Self::new("tone-528", "528 Hz tone", Frequency { hz: 528.0 }),
            Self::new("rain", "Rain", Nature { color: NoiseColor::Rain }),
            Self::new("ocean", "Ocean waves", Nature { color: NoiseColor::Ocean }),
            Self::new("forest", "Forest", Nature { color: NoiseColor::Forest }),
            Self::new("singing-bowl", "Singing bowl", Instrument { style: InstrumentStyle::SingingBowl }),
            Self::new("bell", "Bell", Instrument { style: InstrumentStyle::Bell }),
        ]
    }

    /// Look up a stock profile by id
    pub fn find(id: &str) -> Result<AmbientProfile> {
        Self::catalog()
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown ambient profile: {}", id)))
    }

    /// Build the source chain for this profile, ending in `gain`
    fn build(&self, sample_rate: u32, gain: GainHandle) -> Box<dyn Source> {
        match self.kind {
            AmbientKind::Frequency { hz } => {
                Box::new(Gain::new(SineOscillator::new(hz, sample_rate), gain))
            }
            AmbientKind::Instrument { style } => Box::new(Gain::new(
                SineOscillator::new(style.reference_hz(), sample_rate),
                gain,
            )),
            AmbientKind::Nature { color } => {
                let buffer = generate_noise_buffer(color, sample_rate, &mut rand::thread_rng());
                let filter = match color {
                    NoiseColor::Rain => {
                        Biquad::new(FilterKind::HighPass, RAIN_HIGHPASS_HZ, NATURE_FILTER_Q_DB, sample_rate)
                    }
                    NoiseColor::Ocean | NoiseColor::Forest => {
                        Biquad::new(FilterKind::LowPass, NATURE_LOWPASS_HZ, NATURE_FILTER_Q_DB, sample_rate)
                    }
                };
                Box::new(Gain::new(Filtered::new(LoopingBuffer::new(buffer), filter), gain))
            }
        }
    }
}

struct ActiveGraph {
    profile: AmbientProfile,
    node: NodeId,
    gain: GainHandle,
}

/// Owns at most one live ambient graph
pub struct AmbientEngine {
    context: SharedAudioContext,
    active: Option<ActiveGraph>,
    volume: f32,
}

impl AmbientEngine {
    pub fn new(context: SharedAudioContext, volume: f32) -> Self {
        Self {
            context,
            active: None,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Tear down any current graph and start `profile`
    ///
    /// Silently does nothing when no audio context can be created.
    pub fn activate(&mut self, profile: &AmbientProfile, volume: f32) {
        self.deactivate();
        self.volume = volume.clamp(0.0, 1.0);

        let Some(context) = self.context.get() else {
            return;
        };

        let gain = GainHandle::new(self.volume);
        let node = context.connect(profile.build(context.sample_rate(), gain.clone()));
        info!("Ambient profile '{}' active (node {})", profile.id, node);

        self.active = Some(ActiveGraph {
            profile: profile.clone(),
            node,
            gain,
        });
    }

    /// Stop and disconnect the current graph, if any
    pub fn deactivate(&mut self) {
        let Some(graph) = self.active.take() else {
            return;
        };
        if let Some(context) = self.context.get() {
            context.disconnect(graph.node);
        }
        debug!("Ambient profile '{}' stopped", graph.profile.id);
    }

    /// Adjust the live gain without rebuilding
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(graph) = &self.active {
            graph.gain.set(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_profile(&self) -> Option<&AmbientProfile> {
        self.active.as_ref().map(|g| &g.profile)
    }

    pub fn active_node(&self) -> Option<NodeId> {
        self.active.as_ref().map(|g| g.node)
    }
}

impl Drop for AmbientEngine {
    fn drop(&mut self) {
        self.deactivate();
    }
}
