//! Shared fixtures for sravana-ap integration tests

#![allow(dead_code)]

use sravana_ap::audio::{AudioContext, OfflineContext, SharedAudioContext};
use sravana_ap::config::PlayerConfig;
use sravana_ap::db::{MemoryProgressStore, ProgressStore};
use sravana_ap::Player;
use sravana_common::events::{EventBus, PlayerEvent};
use sravana_common::{Chapter, Track};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const SAMPLE_RATE: u32 = 44_100;

/// Chapters `[{1, 0, 300}, {2, 300, 300}]`, total 600 s, no media
pub fn two_chapter_track() -> Track {
    Track::new(
        Uuid::new_v4(),
        "Two chapters",
        Some(600.0),
        None,
        vec![
            Chapter::new(1, "Opening", 0.0, 300.0),
            Chapter::new(2, "Closing", 300.0, 300.0),
        ],
    )
    .expect("valid track")
}

pub struct TestPlayer {
    pub player: Player,
    pub context: Arc<OfflineContext>,
    pub store: Arc<MemoryProgressStore>,
    pub events: broadcast::Receiver<PlayerEvent>,
}

/// Player backed by an offline context and an in-memory store
pub fn test_player(config: PlayerConfig) -> TestPlayer {
    let context = Arc::new(OfflineContext::new(SAMPLE_RATE));
    let shared = SharedAudioContext::with_context(Arc::clone(&context) as Arc<dyn AudioContext>);
    let store = Arc::new(MemoryProgressStore::new());
    let bus = EventBus::new(1024);
    let events = bus.subscribe();
    let player = Player::new(
        config,
        shared,
        Arc::clone(&store) as Arc<dyn ProgressStore>,
        bus,
    );
    TestPlayer {
        player,
        context,
        store,
        events,
    }
}

/// Drain every event received so far
pub fn drain(events: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn count_fired(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::SleepTimerFired { .. }))
        .count()
}
