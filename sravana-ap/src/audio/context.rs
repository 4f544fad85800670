//! Audio output context and node graph
//!
//! Every sound the player makes (decoded media, ambient synthesis, bell
//! chimes) is a [`Source`] connected to one process-wide [`AudioContext`].
//! The context sums all connected sources into the output buffer and drops
//! sources that report themselves finished.
//!
//! The context is created lazily on first need through a
//! [`SharedAudioContext`] handle owned by the composition root, reused for the
//! life of the process, and never torn down. Tests inject an
//! [`OfflineContext`] instead of opening a device.

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Identifier of a connected source
pub type NodeId = u64;

/// A mono sample generator
///
/// Called from the audio thread; implementations must not block.
pub trait Source: Send {
    /// Next sample in [-1.0, 1.0], or `None` once the source has stopped
    fn next_sample(&mut self) -> Option<f32>;
}

/// Process-wide audio output
pub trait AudioContext: Send + Sync {
    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Start rendering `source`; returns its node id
    fn connect(&self, source: Box<dyn Source>) -> NodeId;

    /// Stop and drop a source. Returns false if it was not connected.
    fn disconnect(&self, node: NodeId) -> bool;

    /// Ids of every connected source
    fn connected_nodes(&self) -> Vec<NodeId>;
}

/// Connected sources, summed per sample
///
/// Shared by the device-backed and offline contexts.
pub struct NodeGraph {
    nodes: Mutex<Vec<(NodeId, Box<dyn Source>)>>,
    next_id: AtomicU64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(NodeId, Box<dyn Source>)>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connect(&self, source: Box<dyn Source>) -> NodeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, source));
        debug!("Connected audio node {}", id);
        id
    }

    pub fn disconnect(&self, node: NodeId) -> bool {
        let mut nodes = self.lock();
        let before = nodes.len();
        nodes.retain(|(id, _)| *id != node);
        let removed = nodes.len() != before;
        if removed {
            debug!("Disconnected audio node {}", node);
        }
        removed
    }

    pub fn connected_nodes(&self) -> Vec<NodeId> {
        self.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Mix one sample from every node, dropping finished ones
    fn mix_sample(nodes: &mut Vec<(NodeId, Box<dyn Source>)>) -> f32 {
        let mut sum = 0.0;
        nodes.retain_mut(|(_, source)| match source.next_sample() {
            Some(sample) => {
                sum += sample;
                true
            }
            None => false,
        });
        sum.clamp(-1.0, 1.0)
    }

    /// Fill an interleaved buffer, writing the mono mix to every channel
    ///
    /// Never blocks: if the graph is being rewired the buffer is silenced.
    pub fn render_interleaved(&self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut nodes = match self.nodes.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                output.fill(0.0);
                return;
            }
        };

        for frame in output.chunks_mut(channels) {
            let sample = Self::mix_sample(&mut nodes);
            frame.fill(sample);
        }
    }

    /// Render `frames` mono samples (blocking lock, for offline use)
    pub fn render_mono(&self, frames: usize) -> Vec<f32> {
        let mut nodes = self.lock();
        (0..frames).map(|_| Self::mix_sample(&mut nodes)).collect()
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Context that renders only when asked
///
/// Used by tests and offline tooling in place of an audio device.
pub struct OfflineContext {
    sample_rate: u32,
    graph: NodeGraph,
}

impl OfflineContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            graph: NodeGraph::new(),
        }
    }

    /// Pull `frames` mono samples through the graph
    pub fn render(&self, frames: usize) -> Vec<f32> {
        self.graph.render_mono(frames)
    }
}

impl AudioContext for OfflineContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn connect(&self, source: Box<dyn Source>) -> NodeId {
        self.graph.connect(source)
    }

    fn disconnect(&self, node: NodeId) -> bool {
        self.graph.disconnect(node)
    }

    fn connected_nodes(&self) -> Vec<NodeId> {
        self.graph.connected_nodes()
    }
}

/// Builds the process-wide context on first use
pub type ContextFactory = Box<dyn Fn() -> Result<Arc<dyn AudioContext>> + Send + Sync>;

struct SharedInner {
    factory: ContextFactory,
    cell: OnceCell<Option<Arc<dyn AudioContext>>>,
}

/// Injectable handle to the lazily created audio context
///
/// Initialization runs at most once. A failed initialization is remembered:
/// every later `get()` returns `None` without retrying, and callers treat
/// that as "synthesis silently unavailable".
#[derive(Clone)]
pub struct SharedAudioContext {
    inner: Arc<SharedInner>,
}

impl SharedAudioContext {
    /// Handle that runs `factory` on first use
    pub fn lazy(factory: ContextFactory) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                factory,
                cell: OnceCell::new(),
            }),
        }
    }

    /// Handle around an already-built context
    pub fn with_context(context: Arc<dyn AudioContext>) -> Self {
        let handle = Self::lazy(Box::new(|| {
            Err(Error::Internal("context already provided".to_string()))
        }));
        let _ = handle.inner.cell.set(Some(context));
        handle
    }

    /// Handle whose context can never be created
    pub fn unavailable() -> Self {
        Self::lazy(Box::new(|| {
            Err(Error::AudioContextUnavailable("audio output disabled".to_string()))
        }))
    }

    /// The context, creating it on first call
    pub fn get(&self) -> Option<Arc<dyn AudioContext>> {
        self.inner
            .cell
            .get_or_init(|| match (self.inner.factory)() {
                Ok(context) => {
                    info!("Audio context created ({} Hz)", context.sample_rate());
                    Some(context)
                }
                Err(e) => {
                    warn!("Audio context unavailable, synthesis disabled: {}", e);
                    None
                }
            })
            .clone()
    }

    /// True once initialization has been attempted
    pub fn is_initialized(&self) -> bool {
        self.inner.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Constant {
        value: f32,
        remaining: Option<usize>,
    }

    impl Source for Constant {
        fn next_sample(&mut self) -> Option<f32> {
            match self.remaining.as_mut() {
                Some(0) => None,
                Some(n) => {
                    *n -= 1;
                    Some(self.value)
                }
                None => Some(self.value),
            }
        }
    }

    #[test]
    fn test_sources_are_summed() {
        let ctx = OfflineContext::new(48_000);
        ctx.connect(Box::new(Constant { value: 0.25, remaining: None }));
        ctx.connect(Box::new(Constant { value: 0.5, remaining: None }));

        let out = ctx.render(4);
        assert!(out.iter().all(|s| (*s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_finished_sources_are_dropped() {
        let ctx = OfflineContext::new(48_000);
        ctx.connect(Box::new(Constant { value: 0.5, remaining: Some(3) }));
        assert_eq!(ctx.connected_nodes().len(), 1);

        let out = ctx.render(5);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.0, 0.0]);
        assert!(ctx.connected_nodes().is_empty());
    }

    #[test]
    fn test_disconnect() {
        let ctx = OfflineContext::new(48_000);
        let a = ctx.connect(Box::new(Constant { value: 0.1, remaining: None }));
        let b = ctx.connect(Box::new(Constant { value: 0.2, remaining: None }));

        assert!(ctx.disconnect(a));
        assert!(!ctx.disconnect(a));
        assert_eq!(ctx.connected_nodes(), vec![b]);
    }

    #[test]
    fn test_render_interleaved_duplicates_channels() {
        let graph = NodeGraph::new();
        graph.connect(Box::new(Constant { value: 0.3, remaining: None }));

        let mut buffer = [0.0f32; 6];
        graph.render_interleaved(&mut buffer, 2);
        assert!(buffer.iter().all(|s| (*s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_shared_context_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let shared = SharedAudioContext::lazy(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(OfflineContext::new(44_100)) as Arc<dyn AudioContext>)
        }));

        assert!(!shared.is_initialized());
        let first = shared.get().unwrap();
        let second = shared.get().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unavailable_context_is_remembered() {
        let shared = SharedAudioContext::unavailable();
        assert!(shared.get().is_none());
        assert!(shared.is_initialized());
        assert!(shared.get().is_none());
    }
}
