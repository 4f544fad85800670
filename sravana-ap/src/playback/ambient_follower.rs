//! Starts and stops ambient sound with playback
//!
//! Ambient plays exactly while the track is playing and a profile is
//! selected. Changes activate or deactivate the engine's graph; the gain is
//! never used as an on/off switch.

use crate::playback::state::PlaybackSnapshot;
use crate::synth::{AmbientEngine, AmbientProfile};
use chrono::Utc;
use sravana_common::events::{EventBus, PlayerEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lock an engine shared between the follower and command handlers
pub fn lock_engine(engine: &Mutex<AmbientEngine>) -> MutexGuard<'_, AmbientEngine> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct AmbientFollower {
    engine: Arc<Mutex<AmbientEngine>>,
    events: EventBus,
}

impl AmbientFollower {
    pub fn new(engine: Arc<Mutex<AmbientEngine>>, events: EventBus) -> Self {
        Self { engine, events }
    }

    /// Bring the engine in line with the desired profile
    fn reconcile(&self, desired: Option<&AmbientProfile>) {
        let mut engine = lock_engine(&self.engine);
        match desired {
            Some(profile) => {
                let volume = engine.volume();
                engine.activate(profile, volume);
                self.events.emit_lossy(PlayerEvent::AmbientChanged {
                    profile_id: Some(profile.id.clone()),
                    active: engine.is_active(),
                    timestamp: Utc::now(),
                });
            }
            None => {
                engine.deactivate();
                self.events.emit_lossy(PlayerEvent::AmbientChanged {
                    profile_id: None,
                    active: false,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Follow `snapshots` and `selection` until cancelled
    pub async fn run(
        &self,
        mut snapshots: watch::Receiver<PlaybackSnapshot>,
        mut selection: watch::Receiver<Option<AmbientProfile>>,
        cancel: CancellationToken,
    ) {
        // Whole profiles are compared: a custom profile may reuse an id
        let mut applied: Option<AmbientProfile> = None;

        loop {
            let playing = snapshots.borrow_and_update().is_playing();
            let selected = selection.borrow_and_update().clone();
            let desired = selected.filter(|_| playing);
            if desired != applied {
                self.reconcile(desired.as_ref());
                applied = desired;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => if changed.is_err() { break },
                changed = selection.changed() => if changed.is_err() { break },
            }
        }
        debug!("Ambient follower stopped");
    }
}
