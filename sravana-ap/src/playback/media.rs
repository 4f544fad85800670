//! Media backends
//!
//! The controller drives transport through [`MediaBackend`]. Two backends
//! exist:
//!
//! - [`DecodedMedia`]: the whole track decoded with symphonia and played
//!   through the shared audio context. Rate changes and sample-rate
//!   conversion both step a fractional read cursor with linear interpolation.
//! - [`VirtualClock`]: demo mode. No audio; position advances with tokio time
//!   scaled by the playback rate while playing.

use crate::audio::decoder::{self, DecodedAudio};
use crate::audio::{AudioContext, NodeId, SharedAudioContext, Source};
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Transport operations the controller needs from a media source
pub trait MediaBackend: Send {
    /// Media length in seconds, if known
    fn duration(&self) -> Option<f64>;
    fn play(&mut self);
    fn pause(&mut self);
    /// Move the playhead; the caller has already clamped `seconds`
    fn seek(&mut self, seconds: f64);
    /// Effective output volume (0 when muted)
    fn set_volume(&mut self, volume: f32);
    fn set_rate(&mut self, rate: f32);
    /// Playhead position in seconds
    fn position(&self) -> f64;
    /// True once the playhead reached the end of the media
    fn is_ended(&self) -> bool;
    /// Release output resources; the backend is silent afterwards
    fn stop(&mut self);
}

fn sanitize(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

// ========================================
// Virtual clock (demo mode)
// ========================================

/// Position clock with no audio behind it
#[derive(Debug, Clone)]
pub struct VirtualClock {
    anchor_position: f64,
    anchor_instant: Option<Instant>,
    rate: f64,
    duration: Option<f64>,
}

impl VirtualClock {
    /// `duration` bounds the clock; `None` runs forever
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            anchor_position: 0.0,
            anchor_instant: None,
            rate: 1.0,
            duration,
        }
    }

    fn is_running(&self) -> bool {
        self.anchor_instant.is_some()
    }

    fn clamp(&self, seconds: f64) -> f64 {
        let seconds = sanitize(seconds);
        match self.duration {
            Some(d) => seconds.min(d),
            None => seconds,
        }
    }

    /// Fold elapsed time into the anchor
    fn rebase(&mut self) {
        self.anchor_position = self.position();
        if self.is_running() {
            self.anchor_instant = Some(Instant::now());
        }
    }
}

impl MediaBackend for VirtualClock {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn play(&mut self) {
        if !self.is_running() {
            self.anchor_instant = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.anchor_position = self.position();
        self.anchor_instant = None;
    }

    fn seek(&mut self, seconds: f64) {
        self.anchor_position = self.clamp(seconds);
        if self.is_running() {
            self.anchor_instant = Some(Instant::now());
        }
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn set_rate(&mut self, rate: f32) {
        self.rebase();
        self.rate = rate as f64;
    }

    fn position(&self) -> f64 {
        let elapsed = self
            .anchor_instant
            .map(|start| start.elapsed().as_secs_f64() * self.rate)
            .unwrap_or(0.0);
        self.clamp(self.anchor_position + elapsed)
    }

    fn is_ended(&self) -> bool {
        self.duration.is_some_and(|d| self.position() >= d)
    }

    fn stop(&mut self) {
        self.pause();
    }
}

// ========================================
// Decoded media
// ========================================

/// State shared between the control side and the audio-thread node
struct Playhead {
    samples: Arc<[f32]>,
    source_rate: u32,
    /// Read cursor in source frames (f64 bits)
    cursor: AtomicU64,
    playing: AtomicBool,
    ended: AtomicBool,
    volume: AtomicU32,
    rate: AtomicU32,
}

impl Playhead {
    fn cursor(&self) -> f64 {
        f64::from_bits(self.cursor.load(Ordering::Acquire))
    }

    fn set_cursor(&self, frames: f64) {
        self.cursor.store(frames.to_bits(), Ordering::Release);
    }

    fn load_f32(cell: &AtomicU32) -> f32 {
        f32::from_bits(cell.load(Ordering::Relaxed))
    }
}

/// Audio-thread reader over a [`Playhead`]
struct PlayheadNode {
    playhead: Arc<Playhead>,
    /// Source frames per output frame at rate 1.0
    base_step: f64,
}

impl Source for PlayheadNode {
    fn next_sample(&mut self) -> Option<f32> {
        let head = &self.playhead;
        if !head.playing.load(Ordering::Acquire) {
            return Some(0.0);
        }

        let cursor = head.cursor();
        let index = cursor.floor() as usize;
        if index + 1 >= head.samples.len() {
            head.set_cursor(head.samples.len() as f64);
            head.playing.store(false, Ordering::Release);
            head.ended.store(true, Ordering::Release);
            return Some(0.0);
        }

        let frac = (cursor - index as f64) as f32;
        let a = head.samples[index];
        let b = head.samples[index + 1];
        let sample = a + (b - a) * frac;

        let step = self.base_step * Playhead::load_f32(&head.rate) as f64;
        // A concurrent seek wins over this advance
        let _ = head.cursor.compare_exchange(
            cursor.to_bits(),
            (cursor + step).to_bits(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        );

        Some(sample * Playhead::load_f32(&head.volume))
    }
}

/// A fully decoded track connected to the audio context
pub struct DecodedMedia {
    playhead: Arc<Playhead>,
    context: Arc<dyn AudioContext>,
    node: Option<NodeId>,
    duration: f64,
}

impl DecodedMedia {
    pub fn new(audio: DecodedAudio, context: Arc<dyn AudioContext>) -> Self {
        let duration = audio.duration_seconds();
        let playhead = Arc::new(Playhead {
            samples: audio.samples.into(),
            source_rate: audio.sample_rate.max(1),
            cursor: AtomicU64::new(0f64.to_bits()),
            playing: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            volume: AtomicU32::new(1f32.to_bits()),
            rate: AtomicU32::new(1f32.to_bits()),
        });

        let base_step = playhead.source_rate as f64 / context.sample_rate().max(1) as f64;
        let node = context.connect(Box::new(PlayheadNode {
            playhead: Arc::clone(&playhead),
            base_step,
        }));

        Self {
            playhead,
            context,
            node: Some(node),
            duration,
        }
    }
}

impl MediaBackend for DecodedMedia {
    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }

    fn play(&mut self) {
        if self.node.is_some() && !self.playhead.ended.load(Ordering::Acquire) {
            self.playhead.playing.store(true, Ordering::Release);
        }
    }

    fn pause(&mut self) {
        self.playhead.playing.store(false, Ordering::Release);
    }

    fn seek(&mut self, seconds: f64) {
        let seconds = sanitize(seconds).min(self.duration);
        self.playhead.set_cursor(seconds * self.playhead.source_rate as f64);
        self.playhead
            .ended
            .store(seconds >= self.duration, Ordering::Release);
    }

    fn set_volume(&mut self, volume: f32) {
        self.playhead
            .volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn set_rate(&mut self, rate: f32) {
        self.playhead.rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    fn position(&self) -> f64 {
        (self.playhead.cursor() / self.playhead.source_rate as f64).min(self.duration)
    }

    fn is_ended(&self) -> bool {
        self.playhead.ended.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.pause();
        if let Some(node) = self.node.take() {
            self.context.disconnect(node);
            debug!("Media node {} disconnected", node);
        }
    }
}

impl Drop for DecodedMedia {
    fn drop(&mut self) {
        self.stop();
    }
}

// ========================================
// Loading
// ========================================

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// File extension of a path or URL, ignoring any query string
fn extension_hint(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Fetch and decode `location` (local path or http(s) URL)
///
/// Fails with `MediaLoad` when the media is unreachable or no audio context
/// exists, and with `Decode` when the bytes are not playable audio.
pub async fn load_media(location: &str, audio: &SharedAudioContext) -> Result<DecodedMedia> {
    let context = audio
        .get()
        .ok_or_else(|| Error::MediaLoad("no audio output available".to_string()))?;

    let extension = extension_hint(location);
    let decoded = if is_remote(location) {
        info!("Fetching media from {}", location);
        let bytes = reqwest::get(location)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::MediaLoad(format!("{}: {}", location, e)))?
            .bytes()
            .await
            .map_err(|e| Error::MediaLoad(format!("{}: {}", location, e)))?
            .to_vec();
        tokio::task::spawn_blocking(move || decoder::decode_bytes(bytes, extension.as_deref()))
            .await
            .map_err(|e| Error::Internal(format!("decode task failed: {}", e)))??
    } else {
        let path = Path::new(location).to_path_buf();
        if !path.exists() {
            return Err(Error::MediaLoad(format!("{} does not exist", location)));
        }
        tokio::task::spawn_blocking(move || decoder::decode_file(&path))
            .await
            .map_err(|e| Error::Internal(format!("decode task failed: {}", e)))??
    };

    info!(
        "Loaded media {} ({:.1}s at {} Hz)",
        location,
        decoded.duration_seconds(),
        decoded.sample_rate
    );
    Ok(DecodedMedia::new(decoded, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineContext;
    use std::time::Duration;

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://cdn.example/a/b/book.MP3?sig=1"), Some("mp3".to_string()));
        assert_eq!(extension_hint("/data/books/gita.m4a"), Some("m4a".to_string()));
        assert_eq!(extension_hint("/data/books/noext"), None);
        assert_eq!(extension_hint("https://cdn.example/"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_advances_only_while_playing() {
        let mut clock = VirtualClock::new(Some(600.0));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.position(), 0.0);

        clock.play();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((clock.position() - 10.0).abs() < 1e-6);

        clock.pause();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((clock.position() - 10.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_rate_and_end() {
        let mut clock = VirtualClock::new(Some(30.0));
        clock.set_rate(2.0);
        clock.play();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((clock.position() - 20.0).abs() < 1e-6);
        assert!(!clock.is_ended());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(clock.position(), 30.0);
        assert!(clock.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_seek_while_playing() {
        let mut clock = VirtualClock::new(None);
        clock.play();
        tokio::time::advance(Duration::from_secs(3)).await;
        clock.seek(100.0);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!((clock.position() - 101.0).abs() < 1e-6);
        assert!(!clock.is_ended());
    }

    fn ramp_media(ctx: &Arc<OfflineContext>, frames: usize, rate: u32) -> DecodedMedia {
        let audio = DecodedAudio {
            samples: (0..frames).map(|i| i as f32 / frames as f32).collect(),
            sample_rate: rate,
            source_channels: 1,
        };
        DecodedMedia::new(audio, ctx.clone())
    }

    #[test]
    fn test_decoded_media_silent_until_played() {
        let ctx = Arc::new(OfflineContext::new(1_000));
        let mut media = ramp_media(&ctx, 1_000, 1_000);

        assert!(ctx.render(10).iter().all(|s| *s == 0.0));
        assert_eq!(media.position(), 0.0);

        media.play();
        ctx.render(500);
        assert!((media.position() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decoded_media_resamples_and_rate() {
        // 2 kHz source on a 1 kHz context advances two source frames per output frame
        let ctx = Arc::new(OfflineContext::new(1_000));
        let mut media = ramp_media(&ctx, 4_000, 2_000);
        media.play();
        ctx.render(100);
        assert!((media.position() - 0.1).abs() < 1e-9);

        media.set_rate(1.5);
        ctx.render(100);
        assert!((media.position() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_decoded_media_reaches_end_and_restarts_after_seek() {
        let ctx = Arc::new(OfflineContext::new(1_000));
        let mut media = ramp_media(&ctx, 100, 1_000);
        media.play();
        ctx.render(200);
        assert!(media.is_ended());
        assert!((media.position() - 0.1).abs() < 1e-9);

        media.seek(0.0);
        assert!(!media.is_ended());
        media.play();
        ctx.render(50);
        assert!((media.position() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_decoded_media_stop_disconnects() {
        let ctx = Arc::new(OfflineContext::new(1_000));
        let mut media = ramp_media(&ctx, 100, 1_000);
        assert_eq!(ctx.connected_nodes().len(), 1);
        media.stop();
        assert!(ctx.connected_nodes().is_empty());
        drop(media);
        assert!(ctx.connected_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_media_load_error() {
        let ctx = SharedAudioContext::with_context(Arc::new(OfflineContext::new(1_000)));
        let result = load_media("/nonexistent/book.mp3", &ctx).await;
        assert!(matches!(result, Err(Error::MediaLoad(_))));
    }

    #[tokio::test]
    async fn test_load_without_audio_output_fails() {
        let result = load_media("/nonexistent/book.mp3", &SharedAudioContext::unavailable()).await;
        assert!(matches!(result, Err(Error::MediaLoad(_))));
    }
}
