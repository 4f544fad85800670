//! Observable playback state

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sravana_common::events::TransportState;
use uuid::Uuid;

/// Allowed playback rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum PlaybackRate {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndAQuarter,
    OneAndAHalf,
    Double,
}

impl PlaybackRate {
    pub const ALL: [PlaybackRate; 6] = [
        PlaybackRate::Half,
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndAQuarter,
        PlaybackRate::OneAndAHalf,
        PlaybackRate::Double,
    ];

    pub fn as_f32(self) -> f32 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndAQuarter => 1.25,
            PlaybackRate::OneAndAHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }
}

impl TryFrom<f32> for PlaybackRate {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| (rate.as_f32() - value).abs() < 1e-3)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "playback rate {} not supported (allowed: 0.5, 0.75, 1, 1.25, 1.5, 2)",
                    value
                ))
            })
    }
}

impl From<PlaybackRate> for f32 {
    fn from(rate: PlaybackRate) -> f32 {
        rate.as_f32()
    }
}

/// Point-in-time view of a session's playback state
///
/// Published on a watch channel after every controller command and time
/// update. `current_chapter_number` always matches `current_time_seconds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub track_id: Uuid,
    pub transport: TransportState,
    pub current_time_seconds: f64,
    /// Upper bound used for clamping; `None` when nothing is known
    pub duration_seconds: Option<f64>,
    pub current_chapter_number: u32,
    pub volume: f32,
    pub is_muted: bool,
    pub playback_rate: PlaybackRate,
    /// No playable media; transport runs on a virtual clock
    pub demo_mode: bool,
}

impl PlaybackSnapshot {
    pub fn is_playing(&self) -> bool {
        self.transport == TransportState::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_parsing() {
        assert_eq!(PlaybackRate::try_from(1.25).unwrap(), PlaybackRate::OneAndAQuarter);
        assert_eq!(PlaybackRate::try_from(2.0).unwrap(), PlaybackRate::Double);
        assert!(matches!(PlaybackRate::try_from(3.0), Err(Error::InvalidInput(_))));
        assert!(PlaybackRate::try_from(f32::NAN).is_err());
    }

    #[test]
    fn test_rate_serializes_as_number() {
        let json = serde_json::to_string(&PlaybackRate::ThreeQuarters).unwrap();
        assert_eq!(json, "0.75");
        let parsed: PlaybackRate = serde_json::from_str("1.5").unwrap();
        assert_eq!(parsed, PlaybackRate::OneAndAHalf);
        assert!(serde_json::from_str::<PlaybackRate>("0.9").is_err());
    }
}
