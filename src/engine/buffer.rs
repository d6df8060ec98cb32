//! Audio Buffer Management
//!
//! Planar 32-bit float buffers used for decoded clips, processing blocks
//! and rendered output. All rendering happens at 44.1kHz stereo.

use crate::error::{EngineError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sample rate for rendering and export (44.1kHz)
pub const RENDER_SAMPLE_RATE: u32 = 44100;

/// Number of output channels
pub const RENDER_CHANNELS: usize = 2;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the peak level of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

/// Calculate the RMS level of an audio buffer in dB
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.channels() * buffer.len();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    linear_to_db((sum_squares / total_samples as f64).sqrt() as f32)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar audio buffer
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate `Vec<f32>`.
///
/// # Example
/// ```
/// use automix::engine::buffer::{AudioBuffer, ChannelLayout, RENDER_SAMPLE_RATE};
///
/// let buffer = AudioBuffer::new(RENDER_SAMPLE_RATE as usize, ChannelLayout::Stereo);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer at the render sample rate
    pub fn new(num_samples: usize, layout: ChannelLayout) -> Self {
        Self::with_sample_rate(num_samples, layout, RENDER_SAMPLE_RATE)
    }

    /// Create a silent buffer at an explicit sample rate
    pub fn with_sample_rate(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `layout` - Channel configuration
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// Result containing the AudioBuffer, or error if data length doesn't match layout
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(EngineError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Fill every channel with silence
    pub fn clear(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Reshape to `frames` × `channels`, keeping samples that still fit
    pub fn resize(&mut self, frames: usize, channels: usize) {
        self.samples.resize(channels, Vec::new());
        for channel in &mut self.samples {
            channel.resize(frames, 0.0);
        }
    }

    /// Copy samples from another buffer with the same shape
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            dst.copy_from_slice(src);
        }
    }

    /// Add another buffer's samples into this one
    pub fn mix_from(&mut self, other: &AudioBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s;
            }
        }
    }

    /// Copy a range of frames into a new buffer, clamped to the buffer end
    pub fn slice_frames(&self, start: usize, len: usize) -> AudioBuffer {
        let start = start.min(self.len());
        let end = start.saturating_add(len).min(self.len());
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| ch[start..end].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Return a stereo copy, duplicating mono input
    pub fn to_stereo(&self) -> AudioBuffer {
        match self.channels() {
            2 => self.clone(),
            1 => AudioBuffer {
                samples: vec![self.samples[0].clone(), self.samples[0].clone()],
                sample_rate: self.sample_rate,
            },
            0 => AudioBuffer::with_sample_rate(0, ChannelLayout::Stereo, self.sample_rate),
            _ => AudioBuffer {
                samples: self.samples[..2].to_vec(),
                sample_rate: self.sample_rate,
            },
        }
    }

    /// Resample every channel to a new length using linear interpolation
    pub fn resample_to_len(&self, new_len: usize) -> AudioBuffer {
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| resample_linear(ch, new_len))
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Resample to a different sample rate using linear interpolation
    pub fn resample(&self, target_rate: u32) -> AudioBuffer {
        if target_rate == self.sample_rate || self.sample_rate == 0 {
            return self.clone();
        }
        let new_len = (self.len() as f64 * target_rate as f64 / self.sample_rate as f64).round()
            as usize;
        let mut resampled = self.resample_to_len(new_len);
        resampled.sample_rate = target_rate;
        resampled
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo)
    }
}

/// Linear-interpolation resampling of one channel
fn resample_linear(input: &[f32], new_len: usize) -> Vec<f32> {
    if input.is_empty() || new_len == 0 {
        return vec![0.0; new_len];
    }
    if new_len == input.len() {
        return input.to_vec();
    }

    let ratio = input.len() as f64 / new_len as f64;
    (0..new_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input[idx.min(input.len() - 1)];
            let b = input[(idx + 1).min(input.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
        assert!(db_to_linear(-120.0) < 1e-5);
    }

    #[test]
    fn test_linear_to_db() {
        assert!((linear_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 1e-4);
        assert!(linear_to_db(0.0).is_infinite() && linear_to_db(0.0).is_sign_negative());
    }

    #[test]
    fn test_interleave_round_trip() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer =
            AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, 44100).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_ragged_data() {
        let result = AudioBuffer::from_interleaved(&[0.0, 0.1, 0.2], ChannelLayout::Stereo, 44100);
        assert!(result.is_err());
    }

    #[test]
    fn test_slice_frames_clamps() {
        let buffer = AudioBuffer::from_interleaved(
            &[1.0, 2.0, 3.0, 4.0],
            ChannelLayout::Mono,
            44100,
        )
        .unwrap();
        assert_eq!(buffer.slice_frames(1, 2).channel(0), &[2.0, 3.0]);
        assert_eq!(buffer.slice_frames(3, 10).channel(0), &[4.0]);
        assert!(buffer.slice_frames(9, 1).is_empty());
    }

    #[test]
    fn test_to_stereo_duplicates_mono() {
        let buffer =
            AudioBuffer::from_interleaved(&[0.5, 0.25], ChannelLayout::Mono, 44100).unwrap();
        let stereo = buffer.to_stereo();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.channel(0), stereo.channel(1));
    }

    #[test]
    fn test_resample_changes_length() {
        let buffer = AudioBuffer::with_sample_rate(48000, ChannelLayout::Stereo, 48000);
        let resampled = buffer.resample(44100);
        assert_eq!(resampled.len(), 44100);
        assert_eq!(resampled.sample_rate, 44100);
    }

    #[test]
    fn test_peak_and_rms() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, -1.0], ChannelLayout::Stereo, 44100)
            .unwrap();
        assert!(calculate_peak(&buffer).abs() < 1e-6);
        assert!(calculate_rms(&buffer).abs() < 1e-6);
    }
}
