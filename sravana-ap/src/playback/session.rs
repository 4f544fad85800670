//! Player composition root
//!
//! [`Player`] is the long-lived object the HTTP layer and key adapter talk
//! to. Opening a track builds a [`PlayerSession`]: the controller plus the
//! background tasks that observe it.
//!
//! Session tasks (all stopped through one `CancellationToken`):
//! - time-update driver: polls the media clock into the controller
//! - sleep timer service and the sleep action that pauses playback
//! - progress checkpointer (authenticated users only)
//! - ambient follower

use crate::audio::SharedAudioContext;
use crate::config::PlayerConfig;
use crate::db::ProgressStore;
use crate::error::{Error, Result};
use crate::playback::ambient_follower::{lock_engine, AmbientFollower};
use crate::playback::checkpoint::ProgressCheckpointer;
use crate::playback::controller::PlaybackController;
use crate::playback::media::{load_media, MediaBackend, VirtualClock};
use crate::playback::sleep_timer::{SleepTimer, SleepTimerHandle, SleepTimerRequest, SleepTimerService};
use crate::playback::state::{PlaybackRate, PlaybackSnapshot};
use crate::synth::{AmbientEngine, AmbientProfile, BellChime};
use chrono::Utc;
use serde::Serialize;
use sravana_common::events::{EventBus, PlayerEvent, SleepTimerState, SleepTrigger};
use sravana_common::human_time::format_clock;
use sravana_common::{ProgressRecord, Track, UserIdentity};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on the final checkpoint written at close
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Ambient selection and engine status
#[derive(Debug, Clone, Serialize)]
pub struct AmbientStatus {
    pub selected: Option<AmbientProfile>,
    pub active: bool,
    pub volume: f32,
}

/// One open track and its background tasks
pub struct PlayerSession {
    track_id: Uuid,
    user: UserIdentity,
    controller: Arc<tokio::sync::Mutex<PlaybackController>>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    sleep_timer: SleepTimerHandle,
    checkpointer: Arc<ProgressCheckpointer>,
    ambient: Arc<Mutex<AmbientEngine>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct SessionParts {
    controller: PlaybackController,
    user: UserIdentity,
    store: Arc<dyn ProgressStore>,
    ambient: Arc<Mutex<AmbientEngine>>,
    ambient_selection: watch::Receiver<Option<AmbientProfile>>,
    chime: Option<BellChime>,
}

impl PlayerSession {
    fn start(parts: SessionParts, config: &PlayerConfig, events: &EventBus) -> Self {
        let SessionParts {
            controller,
            user,
            store,
            ambient,
            ambient_selection,
            chime,
        } = parts;

        let track_id = controller.track().id;
        let snapshots = controller.subscribe();
        let controller = Arc::new(tokio::sync::Mutex::new(controller));
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        // Sleep timer: the pure timer reports firing on a channel; the
        // sleep action task owns the pause
        let (fired_tx, fired_rx) = mpsc::unbounded_channel::<SleepTrigger>();
        let sleep_timer = SleepTimerHandle::new(
            SleepTimer::new(move |trigger| {
                let _ = fired_tx.send(trigger);
            }),
            events.clone(),
        );

        let service = SleepTimerService::new(sleep_timer.clone());
        let (rx, token) = (snapshots.clone(), cancel.clone());
        tasks.push(tokio::spawn(async move { service.run(rx, token).await }));

        let sleep_chime = chime.filter(|_| config.sleep_timer.chime_on_sleep);
        tasks.push(tokio::spawn(sleep_action(
            fired_rx,
            Arc::clone(&controller),
            sleep_chime,
            cancel.clone(),
        )));

        tasks.push(tokio::spawn(time_update_driver(
            Arc::clone(&controller),
            config.time_update_interval(),
            cancel.clone(),
        )));

        let checkpointer = Arc::new(ProgressCheckpointer::new(
            store,
            user,
            config.playback.completion_tolerance_secs,
            events.clone(),
        ));
        if user.is_authenticated() {
            let (cp, rx, token) = (Arc::clone(&checkpointer), snapshots.clone(), cancel.clone());
            let period = config.checkpoint_interval();
            tasks.push(tokio::spawn(async move { cp.run(rx, period, token).await }));
        }

        let follower = AmbientFollower::new(Arc::clone(&ambient), events.clone());
        let (rx, token) = (snapshots.clone(), cancel.clone());
        tasks.push(tokio::spawn(async move {
            follower.run(rx, ambient_selection, token).await
        }));

        debug!("Session for track {} started {} tasks", track_id, tasks.len());

        Self {
            track_id,
            user,
            controller,
            snapshots,
            sleep_timer,
            checkpointer,
            ambient,
            cancel,
            tasks,
        }
    }

    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    pub fn user(&self) -> UserIdentity {
        self.user
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop everything this session started
    ///
    /// Tasks are cancelled, media stopped, ambient deactivated and the sleep
    /// timer reset before the best-effort final checkpoint.
    pub async fn close(mut self) -> PlaybackSnapshot {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let snapshot = {
            let mut controller = self.controller.lock().await;
            let before = controller.snapshot();
            controller.shutdown();
            before
        };
        lock_engine(&self.ambient).deactivate();
        self.sleep_timer.cancel();

        self.checkpointer.flush(&snapshot, CLOSE_FLUSH_TIMEOUT).await;
        info!(
            "Closed session for track {} at {}",
            self.track_id,
            format_clock(snapshot.current_time_seconds)
        );
        snapshot
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Feed the media clock into the controller at a fixed rate
///
/// Also broadcasts `PlaybackProgress` about once a second while playing.
async fn time_update_driver(
    controller: Arc<tokio::sync::Mutex<PlaybackController>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let progress_every = (1000 / period.as_millis().max(1)).max(1) as u64;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut controller = controller.lock().await;
                controller.on_time_update();
                ticks = ticks.wrapping_add(1);
                if controller.is_playing() && ticks % progress_every == 0 {
                    controller.emit_progress();
                }
            }
        }
    }
}

/// Pause playback when the sleep timer fires
async fn sleep_action(
    mut fired: mpsc::UnboundedReceiver<SleepTrigger>,
    controller: Arc<tokio::sync::Mutex<PlaybackController>>,
    chime: Option<BellChime>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            trigger = fired.recv() => {
                let Some(trigger) = trigger else { break };
                controller.lock().await.pause();
                info!("Playback paused by sleep timer ({:?})", trigger);
                if let Some(chime) = &chime {
                    chime.ring();
                }
            }
        }
    }
}

/// Long-lived player
///
/// At most one session is open; opening a track closes the previous one.
pub struct Player {
    config: PlayerConfig,
    audio: SharedAudioContext,
    store: Arc<dyn ProgressStore>,
    events: EventBus,
    session: tokio::sync::Mutex<Option<PlayerSession>>,
    ambient: Arc<Mutex<AmbientEngine>>,
    ambient_selection: watch::Sender<Option<AmbientProfile>>,
    chime: BellChime,
}

impl Player {
    pub fn new(
        config: PlayerConfig,
        audio: SharedAudioContext,
        store: Arc<dyn ProgressStore>,
        events: EventBus,
    ) -> Self {
        let ambient = Arc::new(Mutex::new(AmbientEngine::new(
            audio.clone(),
            config.ambient.default_volume,
        )));
        let chime = BellChime::new(audio.clone(), config.ambient.chime_frequency_hz);
        let (ambient_selection, _) = watch::channel(None);

        Self {
            config,
            audio,
            store,
            events,
            session: tokio::sync::Mutex::new(None),
            ambient,
            ambient_selection,
            chime,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // ========================================
    // Session lifecycle
    // ========================================

    /// Open `track` for `user`, resuming from `initial_progress`
    ///
    /// Without explicit progress, an authenticated user's stored progress is
    /// used (a completed record starts over). The session starts Stopped.
    pub async fn open(
        &self,
        track: Track,
        user: UserIdentity,
        initial_progress: Option<ProgressRecord>,
    ) -> Result<PlaybackSnapshot> {
        let track = track.validated()?;
        self.close().await;

        let (media, demo_mode) = self.load_media_or_demo(&track).await;
        let resume = match initial_progress {
            Some(progress) => Some(progress),
            None => self.fetch_progress(user, track.id).await,
        };

        let mut controller = PlaybackController::new(
            track,
            media,
            demo_mode,
            self.config.playback.default_volume,
            self.events.clone(),
        );
        if let Some(progress) = resume.filter(|p| !p.is_completed) {
            controller.seek(progress.current_position_seconds);
            info!(
                "Resuming track {} at {} (chapter {})",
                progress.track_id,
                format_clock(progress.current_position_seconds),
                controller.snapshot().current_chapter_number
            );
        }

        let track_id = controller.track().id;
        let snapshot = controller.snapshot();
        let session = PlayerSession::start(
            SessionParts {
                controller,
                user,
                store: Arc::clone(&self.store),
                ambient: Arc::clone(&self.ambient),
                ambient_selection: self.ambient_selection.subscribe(),
                chime: Some(self.chime.clone()),
            },
            &self.config,
            &self.events,
        );

        // A concurrent open may have installed a session since the close above
        let displaced = self.session.lock().await.replace(session);
        if let Some(old) = displaced {
            warn!("Session for track {} displaced by track {}", old.track_id(), track_id);
            self.finish(old).await;
        }
        self.events.emit_lossy(PlayerEvent::SessionOpened {
            track_id,
            demo_mode,
            timestamp: Utc::now(),
        });
        info!("Opened track {} (demo_mode={})", track_id, demo_mode);
        Ok(snapshot)
    }

    /// Close the open session; false when nothing was open
    pub async fn close(&self) -> bool {
        let Some(session) = self.session.lock().await.take() else {
            return false;
        };
        self.finish(session).await;
        self.ambient_selection.send_replace(None);
        true
    }

    async fn finish(&self, session: PlayerSession) {
        let track_id = session.track_id();
        let snapshot = session.close().await;
        self.events.emit_lossy(PlayerEvent::SessionClosed {
            track_id,
            position_seconds: snapshot.current_time_seconds,
            timestamp: Utc::now(),
        });
    }

    pub async fn is_open(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn load_media_or_demo(&self, track: &Track) -> (Box<dyn MediaBackend>, bool) {
        let demo_clock = || {
            let bound = track.total_duration_seconds.or_else(|| track.chapters_end_seconds());
            Box::new(VirtualClock::new(bound)) as Box<dyn MediaBackend>
        };

        let Some(location) = track.media_url.as_deref() else {
            return (demo_clock(), true);
        };

        match load_media(location, &self.audio).await {
            Ok(media) => (Box::new(media), false),
            Err(e) => {
                warn!("Media for track {} unavailable, using demo mode: {}", track.id, e);
                self.events.emit_lossy(PlayerEvent::MediaLoadFailed {
                    track_id: track.id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                (demo_clock(), true)
            }
        }
    }

    async fn fetch_progress(&self, user: UserIdentity, track_id: Uuid) -> Option<ProgressRecord> {
        let user_id = user.user_id()?;
        match self.store.fetch_progress(user_id, track_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not fetch progress for track {}: {}", track_id, e);
                None
            }
        }
    }

    // ========================================
    // Transport commands
    // ========================================

    async fn controller(&self) -> Result<Arc<tokio::sync::Mutex<PlaybackController>>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.controller))
            .ok_or(Error::NoSession)
    }

    /// Run `command` against the controller and return the new snapshot
    async fn command<F>(&self, command: F) -> Result<PlaybackSnapshot>
    where
        F: FnOnce(&mut PlaybackController) -> Result<()>,
    {
        let controller = self.controller().await?;
        let mut controller = controller.lock().await;
        command(&mut *controller)?;
        Ok(controller.snapshot())
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(PlayerSession::snapshot)
            .ok_or(Error::NoSession)
    }

    /// Watch channel of snapshots for the open session
    pub async fn subscribe(&self) -> Result<watch::Receiver<PlaybackSnapshot>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.snapshots.clone())
            .ok_or(Error::NoSession)
    }

    pub async fn play(&self) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.play();
            Ok(())
        })
        .await
    }

    pub async fn pause(&self) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.pause();
            Ok(())
        })
        .await
    }

    pub async fn toggle_play(&self) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.toggle_play();
            Ok(())
        })
        .await
    }

    pub async fn seek(&self, seconds: f64) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.seek(seconds);
            Ok(())
        })
        .await
    }

    pub async fn skip(&self, delta_seconds: f64) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.skip(delta_seconds);
            Ok(())
        })
        .await
    }

    pub async fn go_to_chapter(&self, number: u32, auto_resume: bool) -> Result<PlaybackSnapshot> {
        self.command(|c| c.go_to_chapter(number, auto_resume)).await
    }

    pub async fn next_chapter(&self) -> Result<PlaybackSnapshot> {
        self.command(PlaybackController::next_chapter).await
    }

    pub async fn previous_chapter(&self) -> Result<PlaybackSnapshot> {
        self.command(PlaybackController::previous_chapter).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.set_volume(volume);
            Ok(())
        })
        .await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.set_muted(muted);
            Ok(())
        })
        .await
    }

    pub async fn toggle_mute(&self) -> Result<PlaybackSnapshot> {
        self.command(|c| {
            c.toggle_mute();
            Ok(())
        })
        .await
    }

    /// Set the rate; anything outside the six allowed rates is rejected
    pub async fn set_playback_rate(&self, rate: f32) -> Result<PlaybackSnapshot> {
        let rate = PlaybackRate::try_from(rate)?;
        self.command(|c| {
            c.set_playback_rate(rate);
            Ok(())
        })
        .await
    }

    // ========================================
    // Sleep timer
    // ========================================

    async fn sleep_timer(&self) -> Result<(SleepTimerHandle, u32)> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(Error::NoSession)?;
        let chapter = session.snapshots.borrow().current_chapter_number;
        Ok((session.sleep_timer.clone(), chapter))
    }

    pub async fn arm_sleep_timer(&self, request: SleepTimerRequest) -> Result<SleepTimerState> {
        let (timer, chapter) = self.sleep_timer().await?;
        let state = timer.arm(request, chapter)?;
        if self.config.sleep_timer.chime_on_arm {
            self.chime.ring();
        }
        Ok(state)
    }

    pub async fn cancel_sleep_timer(&self) -> Result<bool> {
        let (timer, _) = self.sleep_timer().await?;
        Ok(timer.cancel())
    }

    pub async fn sleep_timer_state(&self) -> Result<SleepTimerState> {
        let (timer, _) = self.sleep_timer().await?;
        Ok(timer.state())
    }

    // ========================================
    // Ambient
    // ========================================

    /// Select a profile (or none); it sounds only while playing
    pub fn select_ambient(&self, profile: Option<AmbientProfile>) {
        match &profile {
            Some(p) => info!("Ambient profile selected: {}", p.id),
            None => info!("Ambient profile cleared"),
        }
        self.ambient_selection.send_replace(profile);
    }

    pub fn set_ambient_volume(&self, volume: f32) -> f32 {
        let mut engine = lock_engine(&self.ambient);
        engine.set_volume(volume);
        engine.volume()
    }

    pub fn ambient_status(&self) -> AmbientStatus {
        let engine = lock_engine(&self.ambient);
        AmbientStatus {
            selected: self.ambient_selection.borrow().clone(),
            active: engine.is_active(),
            volume: engine.volume(),
        }
    }

    /// Ring the bell once; false when no audio output exists
    pub fn chime(&self) -> bool {
        self.chime.ring().is_some()
    }
}
