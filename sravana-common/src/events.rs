//! Event types for the Sravana event system
//!
//! Provides the shared [`PlayerEvent`] enum and the broadcast-backed
//! [`EventBus`]. Events are serializable so the HTTP layer can forward them
//! as SSE frames unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Transport state of the playback state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
        }
    }
}

/// Sleep timer state
///
/// At most one mode is active at a time. Returns to `Idle` on cancel or
/// after firing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SleepTimerState {
    #[default]
    Idle,
    CountingDown {
        remaining_seconds: u32,
        total_seconds: u32,
    },
    ArmedForChapterEnd {
        armed_at_chapter: u32,
    },
}

impl SleepTimerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SleepTimerState::Idle)
    }
}

/// Why a sleep timer returned to idle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SleepTrigger {
    /// Countdown reached zero
    Countdown,
    /// Playback crossed past the armed chapter
    ChapterEnd,
}

/// Player event types
///
/// Broadcast via [`EventBus`] and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A track was opened for playback
    SessionOpened {
        track_id: Uuid,
        /// True when no media could be loaded and the virtual clock drives transport
        demo_mode: bool,
        timestamp: DateTime<Utc>,
    },

    /// The player session was closed
    SessionClosed {
        track_id: Uuid,
        position_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// Transport changed (Stopped/Playing/Paused)
    PlaybackStateChanged {
        old_state: TransportState,
        new_state: TransportState,
        timestamp: DateTime<Utc>,
    },

    /// Resolved chapter changed between two consecutive time updates
    ChapterChanged {
        track_id: Uuid,
        old_chapter: u32,
        new_chapter: u32,
        position_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// Position update (emitted on seek and periodically while playing)
    PlaybackProgress {
        track_id: Uuid,
        position_seconds: f64,
        duration_seconds: Option<f64>,
        chapter: u32,
        timestamp: DateTime<Utc>,
    },

    /// Media reached its end; transport is Stopped
    PlaybackEnded {
        track_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Volume or mute changed
    VolumeChanged {
        volume: f32,
        muted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Playback rate changed
    RateChanged {
        rate: f32,
        timestamp: DateTime<Utc>,
    },

    /// Media source could not be loaded; session continues in demo mode
    MediaLoadFailed {
        track_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Sleep timer armed, ticked or cancelled
    SleepTimerChanged {
        state: SleepTimerState,
        timestamp: DateTime<Utc>,
    },

    /// Sleep timer fired and paused playback
    SleepTimerFired {
        trigger: SleepTrigger,
        timestamp: DateTime<Utc>,
    },

    /// Progress checkpoint written
    ProgressCheckpointed {
        track_id: Uuid,
        chapter: u32,
        position_seconds: f64,
        completed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Progress checkpoint failed (will be retried on the next tick)
    CheckpointFailed {
        track_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Ambient profile activated (Some) or deactivated (None)
    AmbientChanged {
        profile_id: Option<String>,
        active: bool,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string (SSE event name)
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::SessionOpened { .. } => "SessionOpened",
            PlayerEvent::SessionClosed { .. } => "SessionClosed",
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::ChapterChanged { .. } => "ChapterChanged",
            PlayerEvent::PlaybackProgress { .. } => "PlaybackProgress",
            PlayerEvent::PlaybackEnded { .. } => "PlaybackEnded",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::RateChanged { .. } => "RateChanged",
            PlayerEvent::MediaLoadFailed { .. } => "MediaLoadFailed",
            PlayerEvent::SleepTimerChanged { .. } => "SleepTimerChanged",
            PlayerEvent::SleepTimerFired { .. } => "SleepTimerFired",
            PlayerEvent::ProgressCheckpointed { .. } => "ProgressCheckpointed",
            PlayerEvent::CheckpointFailed { .. } => "CheckpointFailed",
            PlayerEvent::AmbientChanged { .. } => "AmbientChanged",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and
/// lose old events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use sravana_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
