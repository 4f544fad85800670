//! Audio device output using cpal
//!
//! The cpal `Stream` is not `Send` on every host, so it is built and kept
//! alive on a dedicated thread. The audio callback pulls the mono mix from a
//! shared [`NodeGraph`] and writes it to every output channel.

use crate::audio::context::{AudioContext, NodeGraph, NodeId, Source};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Preferred output rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Device-backed audio context
pub struct CpalContext {
    sample_rate: u32,
    channels: u16,
    graph: Arc<NodeGraph>,
}

impl CpalContext {
    /// Open the default output device and start rendering
    ///
    /// Blocks until the output thread reports the stream running or failed.
    pub fn open() -> Result<Self> {
        let graph = Arc::new(NodeGraph::new());
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16)>>();
        let thread_graph = Arc::clone(&graph);

        std::thread::Builder::new()
            .name("sravana-audio-out".to_string())
            .spawn(move || {
                let stream = match start_stream(thread_graph) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive for the rest of the process
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            })
            .map_err(|e| Error::AudioContextUnavailable(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx.recv().map_err(|_| {
            Error::AudioContextUnavailable("Output thread exited before reporting".to_string())
        })??;

        info!(
            "Audio output running: sample_rate={}, channels={}",
            sample_rate, channels
        );

        Ok(Self {
            sample_rate,
            channels,
            graph,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioContext for CpalContext {
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

fn start_stream(graph: Arc<NodeGraph>) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioContextUnavailable("No default output device found".to_string()))?;

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using default audio device: {}", name);

    let (config, sample_format) = best_config(&device)?;
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream_f32(&device, &config, graph)?,
        SampleFormat::I16 => build_stream_i16(&device, &config, graph)?,
        other => {
            return Err(Error::AudioContextUnavailable(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioContextUnavailable(format!("Failed to start stream: {}", e)))?;

    Ok((stream, config.sample_rate.0, config.channels))
}

/// Prefer 44.1kHz f32, otherwise the device default
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioContextUnavailable(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|c| {
        c.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
            && c.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
            && c.sample_format() == SampleFormat::F32
    });

    if let Some(c) = preferred {
        let format = c.sample_format();
        return Ok((c.with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE)).config(), format));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::AudioContextUnavailable(format!("Failed to get default config: {}", e)))?;
    let format = default.sample_format();
    Ok((default.config(), format))
}

fn build_stream_f32(device: &Device, config: &StreamConfig, graph: Arc<NodeGraph>) -> Result<Stream> {
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                graph.render_interleaved(data, channels);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioContextUnavailable(format!("Failed to build stream: {}", e)))
}

fn build_stream_i16(device: &Device, config: &StreamConfig, graph: Arc<NodeGraph>) -> Result<Stream> {
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                graph.render_interleaved(&mut scratch, channels);
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioContextUnavailable(format!("Failed to build stream: {}", e)))
}
