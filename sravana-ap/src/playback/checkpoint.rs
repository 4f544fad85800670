//! Periodic progress checkpointing
//!
//! Every interval the latest snapshot is upserted for the authenticated
//! user. Each tick is a complete, idempotent write, so a failed tick is
//! simply superseded by the next one; failures are logged and never stop
//! the loop.

use crate::db::ProgressStore;
use crate::error::StorageError;
use crate::playback::state::PlaybackSnapshot;
use chrono::Utc;
use sravana_common::events::{EventBus, PlayerEvent};
use sravana_common::UserIdentity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// True when `position` is within `tolerance` seconds of a known end
pub fn is_completed(position_seconds: f64, duration_seconds: Option<f64>, tolerance_seconds: f64) -> bool {
    match duration_seconds {
        Some(duration) => position_seconds >= duration - tolerance_seconds,
        None => false,
    }
}

pub struct ProgressCheckpointer {
    store: Arc<dyn ProgressStore>,
    user: UserIdentity,
    completion_tolerance_seconds: f64,
    events: EventBus,
}

impl ProgressCheckpointer {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        user: UserIdentity,
        completion_tolerance_seconds: f64,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            user,
            completion_tolerance_seconds,
            events,
        }
    }

    /// Write one checkpoint
    ///
    /// Returns `Ok(false)` without touching the store for anonymous users.
    pub async fn checkpoint_once(&self, snapshot: &PlaybackSnapshot) -> Result<bool, StorageError> {
        let Some(user_id) = self.user.user_id() else {
            return Ok(false);
        };

        let completed = is_completed(
            snapshot.current_time_seconds,
            snapshot.duration_seconds,
            self.completion_tolerance_seconds,
        );

        let result = self
            .store
            .upsert_progress(
                user_id,
                snapshot.track_id,
                snapshot.current_chapter_number,
                snapshot.current_time_seconds,
                completed,
            )
            .await;

        match &result {
            Ok(()) => {
                debug!(
                    "Checkpoint: track={} chapter={} position={:.1}s completed={}",
                    snapshot.track_id, snapshot.current_chapter_number, snapshot.current_time_seconds, completed
                );
                self.events.emit_lossy(PlayerEvent::ProgressCheckpointed {
                    track_id: snapshot.track_id,
                    chapter: snapshot.current_chapter_number,
                    position_seconds: snapshot.current_time_seconds,
                    completed,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                self.events.emit_lossy(PlayerEvent::CheckpointFailed {
                    track_id: snapshot.track_id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result.map(|()| true)
    }

    /// Checkpoint every `period` until cancelled
    ///
    /// The first write happens one full period after start.
    pub async fn run(
        &self,
        snapshots: watch::Receiver<PlaybackSnapshot>,
        period: Duration,
        cancel: CancellationToken,
    ) {
        if !self.user.is_authenticated() {
            debug!("Anonymous session, checkpointing disabled");
            return;
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = snapshots.borrow().clone();
                    if let Err(e) = self.checkpoint_once(&snapshot).await {
                        warn!("Progress checkpoint failed (will retry next tick): {}", e);
                    }
                }
            }
        }
        debug!("Checkpointer stopped");
    }

    /// Final write on session close, bounded by `limit`
    pub async fn flush(&self, snapshot: &PlaybackSnapshot, limit: Duration) {
        if !self.user.is_authenticated() {
            return;
        }
        match tokio::time::timeout(limit, self.checkpoint_once(snapshot)).await {
            Ok(Ok(_)) => debug!("Final checkpoint written for track {}", snapshot.track_id),
            Ok(Err(e)) => warn!("Final checkpoint failed: {}", e),
            Err(_) => warn!("Final checkpoint timed out after {:?}", limit),
        }
    }
}
