//! Audio Context
//!
//! Owns the engine clock for one playback session or one offline render.
//! Every graph is built against a context and every scheduled time is on
//! that context's clock, so nothing in the engine depends on global state.

use tracing::debug;

use super::buffer::{AudioBuffer, ChannelLayout};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Something that produces audio one block at a time
pub trait RenderSource {
    /// Overwrite `out` with the block that starts at engine time `start_time`
    fn render_block(&mut self, start_time: f64, out: &mut AudioBuffer);
}

/// How the context is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Pulled by the host audio callback
    Realtime,
    /// Rendered as fast as possible into a fixed-length buffer
    Offline { length_frames: usize },
}

/// Engine clock and rendering settings for one pass
#[derive(Debug, Clone)]
pub struct AudioContext {
    kind: ContextKind,
    sample_rate: u32,
    block_size: usize,
    frames_processed: u64,
}

impl AudioContext {
    /// Create a context for interactive playback
    pub fn realtime(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            kind: ContextKind::Realtime,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            frames_processed: 0,
        })
    }

    /// Create a non-real-time context holding `duration_secs` of audio
    pub fn offline(config: &EngineConfig, duration_secs: f64) -> Result<Self> {
        config.validate()?;
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(EngineError::ContextAllocation {
                reason: format!("invalid render duration {}s", duration_secs),
            });
        }
        let length_frames = (duration_secs * config.sample_rate as f64).round() as usize;
        if length_frames == 0 {
            return Err(EngineError::ContextAllocation {
                reason: format!("render duration {}s is shorter than one frame", duration_secs),
            });
        }

        debug!(length_frames, sample_rate = config.sample_rate, "Created offline context");
        Ok(Self {
            kind: ContextKind::Offline { length_frames },
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            frames_processed: 0,
        })
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.kind, ContextKind::Offline { .. })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Output length of an offline context
    pub fn length_frames(&self) -> Option<usize> {
        match self.kind {
            ContextKind::Offline { length_frames } => Some(length_frames),
            ContextKind::Realtime => None,
        }
    }

    /// Engine time of the next frame to be rendered, in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_processed as f64 / self.sample_rate as f64
    }

    /// Frame index of an engine time, rounded up to the next whole frame
    pub fn time_to_frame(&self, time: f64) -> u64 {
        let frames = time * self.sample_rate as f64;
        // tolerate representation error on exact frame boundaries
        (frames - 1e-6).ceil().max(0.0) as u64
    }

    /// Pull one block from `source` and advance the clock
    pub fn pull(&mut self, source: &mut dyn RenderSource, out: &mut AudioBuffer) {
        source.render_block(self.current_time(), out);
        self.frames_processed += out.len() as u64;
    }

    /// Render an offline context to completion
    ///
    /// # Returns
    /// The full-length stereo buffer, or a resource error if it cannot be
    /// allocated. No partial output is ever returned.
    pub fn start_rendering(&mut self, source: &mut dyn RenderSource) -> Result<AudioBuffer> {
        let length = self
            .length_frames()
            .ok_or_else(|| EngineError::ContextAllocation {
                reason: "start_rendering requires an offline context".to_string(),
            })?;

        let mut output = allocate_stereo(length, self.sample_rate)?;
        let mut block = AudioBuffer::with_sample_rate(
            self.block_size,
            ChannelLayout::Stereo,
            self.sample_rate,
        );

        let mut position = 0;
        while position < length {
            let frames = self.block_size.min(length - position);
            if frames != block.len() {
                block = AudioBuffer::with_sample_rate(frames, ChannelLayout::Stereo, self.sample_rate);
            }
            self.pull(source, &mut block);
            for (dst, src) in output.samples.iter_mut().zip(&block.samples) {
                dst[position..position + frames].copy_from_slice(src);
            }
            position += frames;
        }
        Ok(output)
    }
}

/// Allocate a silent stereo buffer, reporting allocation failure as an error
fn allocate_stereo(length: usize, sample_rate: u32) -> Result<AudioBuffer> {
    let mut samples = Vec::with_capacity(2);
    for _ in 0..2 {
        let mut channel: Vec<f32> = Vec::new();
        channel
            .try_reserve_exact(length)
            .map_err(|err| EngineError::ContextAllocation {
                reason: format!("cannot allocate {} frames: {}", length, err),
            })?;
        channel.resize(length, 0.0);
        samples.push(channel);
    }
    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}
