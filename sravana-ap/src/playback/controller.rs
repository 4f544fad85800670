//! Playback state machine
//!
//! Transport states: Stopped, Playing, Paused. Every command mutates the
//! state, recomputes the chapter from the new time in the same step, and
//! publishes exactly one [`PlaybackSnapshot`] on the watch channel.
//!
//! ```text
//! Stopped/Paused --play--> Playing --pause--> Paused
//! Playing --end of media--> Stopped (no auto-advance)
//! any --seek/skip/goToChapter--> same state (goToChapter may resume)
//! ```

use crate::error::{Error, Result};
use crate::playback::chapters;
use crate::playback::media::MediaBackend;
use crate::playback::state::{PlaybackRate, PlaybackSnapshot};
use chrono::Utc;
use sravana_common::events::{EventBus, PlayerEvent, TransportState};
use sravana_common::human_time::format_clock;
use sravana_common::Track;
use tokio::sync::watch;
use tracing::{debug, info};

/// Central playback state machine for one open track
pub struct PlaybackController {
    track: Track,
    media: Box<dyn MediaBackend>,
    state: PlaybackSnapshot,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    events: EventBus,
}

impl PlaybackController {
    /// Create a Stopped controller at time 0
    ///
    /// Duration used for clamping: the track's total, else the media's,
    /// else the end of the last chapter, else unbounded.
    pub fn new(
        track: Track,
        mut media: Box<dyn MediaBackend>,
        demo_mode: bool,
        volume: f32,
        events: EventBus,
    ) -> Self {
        let duration_seconds = track
            .total_duration_seconds
            .or_else(|| media.duration())
            .or_else(|| track.chapters_end_seconds());

        let volume = volume.clamp(0.0, 1.0);
        media.set_volume(volume);

        let state = PlaybackSnapshot {
            track_id: track.id,
            transport: TransportState::Stopped,
            current_time_seconds: 0.0,
            duration_seconds,
            current_chapter_number: chapters::resolve(0.0, &track.chapters),
            volume,
            is_muted: false,
            playback_rate: PlaybackRate::Normal,
            demo_mode,
        };
        let (snapshot_tx, _) = watch::channel(state.clone());

        Self {
            track,
            media,
            state,
            snapshot_tx,
            events,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state.clone()
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    // ========================================
    // Transport
    // ========================================

    /// Start or resume playback
    ///
    /// Playing from the very end restarts the track.
    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        if self.at_end() {
            self.media.seek(0.0);
            self.apply_time(0.0);
        }
        self.media.play();
        self.set_transport(TransportState::Playing);
        self.emit_progress();
        self.publish();
    }

    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.media.pause();
        self.apply_time(self.media.position());
        self.set_transport(TransportState::Paused);
        self.emit_progress();
        self.publish();
    }

    pub fn toggle_play(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Halt playback, keeping the position
    pub fn stop(&mut self) {
        self.media.pause();
        self.apply_time(self.media.position());
        self.set_transport(TransportState::Stopped);
        self.publish();
    }

    /// Move to `seconds`, clamped to [0, duration]; returns the applied time
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let target = self.clamp_time(seconds);
        self.media.seek(target);
        self.apply_time(target);
        debug!("Seek to {} (chapter {})", format_clock(target), self.state.current_chapter_number);
        self.emit_progress();
        self.publish();
        target
    }

    /// Seek relative to the current time
    pub fn skip(&mut self, delta_seconds: f64) -> f64 {
        let delta = if delta_seconds.is_finite() { delta_seconds } else { 0.0 };
        self.seek(self.state.current_time_seconds + delta)
    }

    /// Jump to the start of chapter `number`
    ///
    /// When paused or stopped and `auto_resume` is set, playback starts.
    pub fn go_to_chapter(&mut self, number: u32, auto_resume: bool) -> Result<()> {
        let start = chapters::chapter_by_number(&self.track.chapters, number)
            .map(|c| c.start_time_seconds)
            .ok_or(Error::ChapterNotFound(number))?;

        let target = self.clamp_time(start);
        self.media.seek(target);
        self.apply_time(target);
        // A jump names its chapter even when two chapters share a start
        self.set_chapter(number);
        info!("Jumped to chapter {} at {}", number, format_clock(target));

        if auto_resume && !self.is_playing() {
            self.media.play();
            self.set_transport(TransportState::Playing);
        }
        self.emit_progress();
        self.publish();
        Ok(())
    }

    pub fn next_chapter(&mut self) -> Result<()> {
        let next = chapters::next_chapter(&self.track.chapters, self.state.current_chapter_number)
            .map(|c| c.number)
            .ok_or_else(|| Error::InvalidState("already at the last chapter".to_string()))?;
        self.go_to_chapter(next, false)
    }

    /// Restart the current chapter, or go to the previous one near its start
    pub fn previous_chapter(&mut self) -> Result<()> {
        let target = chapters::previous_chapter_target(&self.track.chapters, self.state.current_time_seconds)
            .map(|c| c.number)
            .ok_or_else(|| Error::InvalidState("track has no chapters".to_string()))?;
        self.go_to_chapter(target, false)
    }

    // ========================================
    // Output settings
    // ========================================

    pub fn set_volume(&mut self, volume: f32) {
        self.state.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.apply_output_volume();
        self.publish();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.is_muted = muted;
        self.apply_output_volume();
        self.publish();
    }

    pub fn toggle_mute(&mut self) {
        self.set_muted(!self.state.is_muted);
    }

    pub fn set_playback_rate(&mut self, rate: PlaybackRate) {
        self.state.playback_rate = rate;
        self.media.set_rate(rate.as_f32());
        self.events.emit_lossy(PlayerEvent::RateChanged {
            rate: rate.as_f32(),
            timestamp: Utc::now(),
        });
        self.publish();
    }

    // ========================================
    // Time updates
    // ========================================

    /// Pull the media position into the state
    ///
    /// Called by the time-update driver. Detects end of media.
    pub fn on_time_update(&mut self) {
        let position = self.media.position();
        let changed = (position - self.state.current_time_seconds).abs() > f64::EPSILON;
        if changed {
            self.apply_time(position);
        }

        if self.is_playing() && self.media.is_ended() {
            self.media.pause();
            self.set_transport(TransportState::Stopped);
            info!("Playback ended for track {}", self.track.id);
            self.events.emit_lossy(PlayerEvent::PlaybackEnded {
                track_id: self.track.id,
                timestamp: Utc::now(),
            });
            self.publish();
        } else if changed {
            self.publish();
        }
    }

    /// Broadcast the current position
    pub fn emit_progress(&self) {
        self.events.emit_lossy(PlayerEvent::PlaybackProgress {
            track_id: self.track.id,
            position_seconds: self.state.current_time_seconds,
            duration_seconds: self.state.duration_seconds,
            chapter: self.state.current_chapter_number,
            timestamp: Utc::now(),
        });
    }

    /// Stop and release the media backend
    pub fn shutdown(&mut self) {
        self.media.stop();
        self.set_transport(TransportState::Stopped);
        self.publish();
    }

    // ========================================
    // Internals
    // ========================================

    fn clamp_time(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        match self.state.duration_seconds {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }

    /// Media can end before the declared duration when the file is short
    fn at_end(&self) -> bool {
        self.media.is_ended()
            || self
                .state
                .duration_seconds
                .is_some_and(|d| self.state.current_time_seconds >= d)
    }

    /// Set time and recompute the chapter in one step
    fn apply_time(&mut self, seconds: f64) {
        let time = self.clamp_time(seconds);
        self.state.current_time_seconds = time;
        self.set_chapter(chapters::resolve(time, &self.track.chapters));
    }

    fn set_chapter(&mut self, number: u32) {
        let old = self.state.current_chapter_number;
        if old == number {
            return;
        }
        self.state.current_chapter_number = number;
        debug!("Chapter {} -> {}", old, number);
        self.events.emit_lossy(PlayerEvent::ChapterChanged {
            track_id: self.track.id,
            old_chapter: old,
            new_chapter: number,
            position_seconds: self.state.current_time_seconds,
            timestamp: Utc::now(),
        });
    }

    fn set_transport(&mut self, new_state: TransportState) {
        let old_state = self.state.transport;
        if old_state == new_state {
            return;
        }
        self.state.transport = new_state;
        info!("Transport {} -> {}", old_state, new_state);
        self.events.emit_lossy(PlayerEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn apply_output_volume(&mut self) {
        let effective = if self.state.is_muted { 0.0 } else { self.state.volume };
        self.media.set_volume(effective);
        self.events.emit_lossy(PlayerEvent::VolumeChanged {
            volume: self.state.volume,
            muted: self.state.is_muted,
            timestamp: Utc::now(),
        });
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{DecodedAudio, OfflineContext};
    use crate::playback::media::{DecodedMedia, VirtualClock};
    use sravana_common::Chapter;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn track(total: Option<f64>) -> Track {
        Track::new(
            Uuid::new_v4(),
            "Test",
            total,
            None,
            vec![
                Chapter::new(1, "One", 0.0, 300.0),
                Chapter::new(2, "Two", 300.0, 300.0),
            ],
        )
        .unwrap()
    }

    fn controller(total: Option<f64>) -> PlaybackController {
        let track = track(total);
        let clock = VirtualClock::new(total.or(track.chapters_end_seconds()));
        PlaybackController::new(track, Box::new(clock), true, 0.8, EventBus::new(64))
    }

    #[test]
    fn test_initial_state() {
        let c = controller(Some(600.0));
        let s = c.snapshot();
        assert_eq!(s.transport, TransportState::Stopped);
        assert_eq!(s.current_time_seconds, 0.0);
        assert_eq!(s.current_chapter_number, 1);
        assert_eq!(s.duration_seconds, Some(600.0));
        assert!(s.demo_mode);
    }

    #[test]
    fn test_seek_clamps_and_resolves_chapter() {
        let mut c = controller(Some(600.0));
        assert_eq!(c.seek(305.0), 305.0);
        assert_eq!(c.snapshot().current_chapter_number, 2);

        assert_eq!(c.seek(-20.0), 0.0);
        assert_eq!(c.snapshot().current_chapter_number, 1);

        assert_eq!(c.seek(1e9), 600.0);
        assert_eq!(c.seek(f64::NAN), 0.0);
    }

    #[test]
    fn test_duration_falls_back_to_chapters() {
        let mut c = controller(None);
        assert_eq!(c.snapshot().duration_seconds, Some(600.0));
        assert_eq!(c.skip(10_000.0), 600.0);
    }

    #[test]
    fn test_go_to_chapter() {
        let mut c = controller(Some(600.0));
        c.go_to_chapter(2, false).unwrap();
        let s = c.snapshot();
        assert_eq!(s.current_time_seconds, 300.0);
        assert_eq!(s.current_chapter_number, 2);
        assert_eq!(s.transport, TransportState::Stopped);

        c.go_to_chapter(1, true).unwrap();
        assert_eq!(c.snapshot().transport, TransportState::Playing);

        assert!(matches!(c.go_to_chapter(9, true), Err(Error::ChapterNotFound(9))));
        assert_eq!(c.snapshot().current_chapter_number, 1);
    }

    #[test]
    fn test_chapter_navigation() {
        let mut c = controller(Some(600.0));
        c.next_chapter().unwrap();
        assert_eq!(c.snapshot().current_chapter_number, 2);
        assert!(c.next_chapter().is_err());

        c.seek(400.0);
        c.previous_chapter().unwrap();
        assert_eq!(c.snapshot().current_time_seconds, 300.0);
        c.previous_chapter().unwrap();
        assert_eq!(c.snapshot().current_chapter_number, 1);
    }

    #[test]
    fn test_volume_and_mute() {
        let mut c = controller(Some(600.0));
        c.set_volume(1.7);
        assert_eq!(c.snapshot().volume, 1.0);
        c.toggle_mute();
        assert!(c.snapshot().is_muted);
        c.set_muted(false);
        assert!(!c.snapshot().is_muted);
    }

    #[test]
    fn test_every_command_publishes() {
        let mut c = controller(Some(600.0));
        let mut rx = c.subscribe();
        rx.borrow_and_update();

        c.seek(10.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().current_time_seconds, 10.0);

        c.set_playback_rate(PlaybackRate::Double);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().playback_rate, PlaybackRate::Double);
    }

    #[test]
    fn test_events_emitted() {
        let mut c = controller(Some(600.0));
        let mut events = c.events.subscribe();

        c.play();
        c.seek(310.0);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.event_type());
        }
        assert!(kinds.contains(&"PlaybackStateChanged"));
        assert!(kinds.contains(&"ChapterChanged"));
        assert!(kinds.contains(&"PlaybackProgress"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_updates_follow_clock_and_end() {
        let mut c = controller(Some(600.0));
        c.seek(295.0);
        c.play();

        tokio::time::advance(Duration::from_secs(10)).await;
        c.on_time_update();
        let s = c.snapshot();
        assert!((s.current_time_seconds - 305.0).abs() < 1e-6);
        assert_eq!(s.current_chapter_number, 2);

        tokio::time::advance(Duration::from_secs(400)).await;
        c.on_time_update();
        let s = c.snapshot();
        assert_eq!(s.transport, TransportState::Stopped);
        assert_eq!(s.current_time_seconds, 600.0);

        // Playing from the end restarts
        c.play();
        assert_eq!(c.snapshot().current_time_seconds, 0.0);
        assert!(c.is_playing());
    }

    #[test]
    fn test_play_restarts_media_shorter_than_declared_total() {
        let ctx = Arc::new(OfflineContext::new(1_000));
        let audio = DecodedAudio {
            samples: vec![0.25; 100],
            sample_rate: 1_000,
            source_channels: 1,
        };
        let media = DecodedMedia::new(audio, ctx.clone());
        let mut c = PlaybackController::new(track(Some(1.0)), Box::new(media), false, 0.8, EventBus::new(64));

        c.play();
        ctx.render(200);
        c.on_time_update();
        let s = c.snapshot();
        assert_eq!(s.transport, TransportState::Stopped);
        assert!((s.current_time_seconds - 0.1).abs() < 1e-9);

        c.play();
        assert_eq!(c.snapshot().current_time_seconds, 0.0);
        ctx.render(50);
        c.on_time_update();
        let s = c.snapshot();
        assert_eq!(s.transport, TransportState::Playing);
        assert!((s.current_time_seconds - 0.05).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_time() {
        let mut c = controller(Some(600.0));
        c.play();
        tokio::time::advance(Duration::from_secs(5)).await;
        c.pause();
        assert!((c.snapshot().current_time_seconds - 5.0).abs() < 1e-6);

        tokio::time::advance(Duration::from_secs(60)).await;
        c.on_time_update();
        assert!((c.snapshot().current_time_seconds - 5.0).abs() < 1e-6);
        assert_eq!(c.snapshot().transport, TransportState::Paused);
    }
}
