//! Sleep timer
//!
//! [`SleepTimer`] is the pure state machine:
//!
//! ```text
//! Idle --arm_countdown(m)--> CountingDown{remaining = m * 60}
//! Idle --arm_chapter_end--> ArmedForChapterEnd{armed_at_chapter}
//! CountingDown --tick while playing--> remaining - 1; at 0 fire -> Idle
//! ArmedForChapterEnd --chapter > armed while playing--> fire -> Idle
//! any --cancel--> Idle (no callback)
//! ```
//!
//! [`SleepTimerService`] drives it from the controller's snapshot stream.
//! The one-second interval exists only while counting down and playing;
//! pausing drops it and resuming creates a fresh one.

use crate::error::{Error, Result};
use crate::playback::state::PlaybackSnapshot;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sravana_common::events::{EventBus, PlayerEvent, SleepTimerState, SleepTrigger};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TICK: Duration = Duration::from_secs(1);

/// How the user armed the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "minutes", rename_all = "snake_case")]
pub enum SleepTimerRequest {
    /// Pause after this many minutes of playback
    Minutes(u32),
    /// Pause when playback crosses into the next chapter
    ChapterEnd,
}

type SleepCallback = Box<dyn FnMut(SleepTrigger) + Send>;

/// Sleep timer state machine
pub struct SleepTimer {
    state: SleepTimerState,
    on_sleep: SleepCallback,
}

impl SleepTimer {
    /// `on_sleep` runs once each time the timer fires
    pub fn new(on_sleep: impl FnMut(SleepTrigger) + Send + 'static) -> Self {
        Self {
            state: SleepTimerState::Idle,
            on_sleep: Box::new(on_sleep),
        }
    }

    pub fn state(&self) -> SleepTimerState {
        self.state
    }

    pub fn is_counting_down(&self) -> bool {
        matches!(self.state, SleepTimerState::CountingDown { .. })
    }

    /// Arm a countdown, replacing any armed mode
    pub fn arm_countdown(&mut self, minutes: u32) -> Result<SleepTimerState> {
        if minutes == 0 {
            return Err(Error::InvalidInput("sleep timer needs at least 1 minute".to_string()));
        }
        let total_seconds = minutes
            .checked_mul(60)
            .ok_or_else(|| Error::InvalidInput(format!("sleep timer of {} minutes is too long", minutes)))?;

        self.state = SleepTimerState::CountingDown {
            remaining_seconds: total_seconds,
            total_seconds,
        };
        Ok(self.state)
    }

    /// Arm for the end of `current_chapter`, replacing any armed mode
    pub fn arm_chapter_end(&mut self, current_chapter: u32) -> SleepTimerState {
        self.state = SleepTimerState::ArmedForChapterEnd {
            armed_at_chapter: current_chapter,
        };
        self.state
    }

    /// Return to Idle without firing; true if something was armed
    pub fn cancel(&mut self) -> bool {
        let was_armed = !self.state.is_idle();
        self.state = SleepTimerState::Idle;
        was_armed
    }

    /// One second elapsed
    ///
    /// Ignored unless counting down and playing.
    pub fn tick(&mut self, is_playing: bool) -> Option<SleepTrigger> {
        if !is_playing {
            return None;
        }
        let SleepTimerState::CountingDown {
            remaining_seconds,
            total_seconds,
        } = self.state
        else {
            return None;
        };

        let remaining_seconds = remaining_seconds.saturating_sub(1);
        if remaining_seconds == 0 {
            return Some(self.fire(SleepTrigger::Countdown));
        }
        self.state = SleepTimerState::CountingDown {
            remaining_seconds,
            total_seconds,
        };
        None
    }

    /// The resolved chapter changed
    pub fn on_chapter_change(&mut self, new_chapter: u32, is_playing: bool) -> Option<SleepTrigger> {
        match self.state {
            SleepTimerState::ArmedForChapterEnd { armed_at_chapter }
                if is_playing && new_chapter > armed_at_chapter =>
            {
                Some(self.fire(SleepTrigger::ChapterEnd))
            }
            _ => None,
        }
    }

    fn fire(&mut self, trigger: SleepTrigger) -> SleepTrigger {
        self.state = SleepTimerState::Idle;
        (self.on_sleep)(trigger);
        trigger
    }
}

/// Shared access to a session's sleep timer
///
/// Every state change is broadcast as `SleepTimerChanged` and wakes the
/// service so it can create or drop its interval.
#[derive(Clone)]
pub struct SleepTimerHandle {
    timer: Arc<Mutex<SleepTimer>>,
    changed: Arc<Notify>,
    events: EventBus,
}

impl SleepTimerHandle {
    pub fn new(timer: SleepTimer, events: EventBus) -> Self {
        Self {
            timer: Arc::new(Mutex::new(timer)),
            changed: Arc::new(Notify::new()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SleepTimer> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SleepTimerState {
        self.lock().state()
    }

    pub fn is_counting_down(&self) -> bool {
        self.lock().is_counting_down()
    }

    /// Arm (or re-arm) the timer
    pub fn arm(&self, request: SleepTimerRequest, current_chapter: u32) -> Result<SleepTimerState> {
        let state = {
            let mut timer = self.lock();
            match request {
                SleepTimerRequest::Minutes(minutes) => timer.arm_countdown(minutes)?,
                SleepTimerRequest::ChapterEnd => timer.arm_chapter_end(current_chapter),
            }
        };
        info!("Sleep timer armed: {:?}", state);
        self.state_changed(state);
        Ok(state)
    }

    pub fn cancel(&self) -> bool {
        let was_armed = self.lock().cancel();
        if was_armed {
            info!("Sleep timer cancelled");
            self.state_changed(SleepTimerState::Idle);
        }
        was_armed
    }

    fn tick(&self, is_playing: bool) {
        let (fired, state) = {
            let mut timer = self.lock();
            (timer.tick(is_playing), timer.state())
        };
        self.after_step(fired, state);
    }

    fn chapter_changed(&self, new_chapter: u32, is_playing: bool) {
        let (fired, state) = {
            let mut timer = self.lock();
            (timer.on_chapter_change(new_chapter, is_playing), timer.state())
        };
        if fired.is_some() {
            self.after_step(fired, state);
        }
    }

    fn after_step(&self, fired: Option<SleepTrigger>, state: SleepTimerState) {
        if let Some(trigger) = fired {
            info!("Sleep timer fired ({:?})", trigger);
            self.events.emit_lossy(PlayerEvent::SleepTimerFired {
                trigger,
                timestamp: Utc::now(),
            });
        }
        self.state_changed(state);
    }

    fn state_changed(&self, state: SleepTimerState) {
        self.events.emit_lossy(PlayerEvent::SleepTimerChanged {
            state,
            timestamp: Utc::now(),
        });
        self.changed.notify_one();
    }
}

/// Async driver for a [`SleepTimerHandle`]
pub struct SleepTimerService {
    handle: SleepTimerHandle,
}

impl SleepTimerService {
    pub fn new(handle: SleepTimerHandle) -> Self {
        Self { handle }
    }

    /// Run until `cancel` fires or the snapshot channel closes
    pub async fn run(self, mut snapshots: watch::Receiver<PlaybackSnapshot>, cancel: CancellationToken) {
        let mut current = snapshots.borrow_and_update().clone();
        let mut last_chapter = current.current_chapter_number;
        let mut ticker: Option<Interval> = None;

        loop {
            let should_tick = current.is_playing() && self.handle.is_counting_down();
            if should_tick && ticker.is_none() {
                debug!("Sleep countdown interval started");
                ticker = Some(new_ticker());
            } else if !should_tick && ticker.is_some() {
                debug!("Sleep countdown interval dropped");
                ticker = None;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    current = snapshots.borrow_and_update().clone();
                    if current.current_chapter_number != last_chapter {
                        last_chapter = current.current_chapter_number;
                        self.handle.chapter_changed(last_chapter, current.is_playing());
                    }
                }
                _ = self.handle.changed.notified() => {}
                _ = next_tick(&mut ticker) => {
                    self.handle.tick(current.is_playing());
                }
            }
        }
        debug!("Sleep timer service stopped");
    }
}

fn new_ticker() -> Interval {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted() -> (SleepTimer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let timer = SleepTimer::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (timer, calls)
    }

    #[test]
    fn test_zero_minutes_rejected() {
        let (mut timer, _) = counted();
        assert!(matches!(timer.arm_countdown(0), Err(Error::InvalidInput(_))));
        assert!(timer.state().is_idle());
    }

    #[test]
    fn test_paused_ticks_never_decrement() {
        let (mut timer, calls) = counted();
        timer.arm_countdown(1).unwrap();
        for _ in 0..500 {
            assert!(timer.tick(false).is_none());
        }
        assert_eq!(
            timer.state(),
            SleepTimerState::CountingDown { remaining_seconds: 60, total_seconds: 60 }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_countdown_fires_exactly_once() {
        let (mut timer, calls) = counted();
        timer.arm_countdown(2).unwrap();

        for _ in 0..119 {
            assert!(timer.tick(true).is_none());
        }
        assert_eq!(timer.tick(true), Some(SleepTrigger::Countdown));
        assert!(timer.state().is_idle());

        for _ in 0..10 {
            assert!(timer.tick(true).is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chapter_end_fires_only_past_armed_chapter() {
        let (mut timer, calls) = counted();
        timer.arm_chapter_end(3);

        assert!(timer.on_chapter_change(2, true).is_none());
        assert!(timer.on_chapter_change(3, true).is_none());
        assert!(timer.on_chapter_change(4, false).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(timer.on_chapter_change(4, true), Some(SleepTrigger::ChapterEnd));
        assert!(timer.on_chapter_change(5, true).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_does_not_fire() {
        let (mut timer, calls) = counted();
        assert!(!timer.cancel());
        timer.arm_countdown(5).unwrap();
        assert!(timer.cancel());
        assert!(timer.tick(true).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rearm_replaces_mode() {
        let (mut timer, _) = counted();
        timer.arm_countdown(5).unwrap();
        timer.arm_chapter_end(2);
        assert_eq!(timer.state(), SleepTimerState::ArmedForChapterEnd { armed_at_chapter: 2 });
        assert!(timer.tick(true).is_none());

        timer.arm_countdown(1).unwrap();
        assert!(timer.on_chapter_change(9, true).is_none());
        assert!(timer.is_counting_down());
    }

    #[test]
    fn test_request_serde() {
        let minutes: SleepTimerRequest = serde_json::from_str(r#"{"mode":"minutes","minutes":15}"#).unwrap();
        assert_eq!(minutes, SleepTimerRequest::Minutes(15));
        let chapter: SleepTimerRequest = serde_json::from_str(r#"{"mode":"chapter_end"}"#).unwrap();
        assert_eq!(chapter, SleepTimerRequest::ChapterEnd);
    }
}
