//! Output format encoders
//!
//! All encoders take float PCM in `[-1, 1]` and produce a complete file in
//! memory, so a failed encode never leaves a partial file behind.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use super::buffer::{AudioBuffer, RENDER_CHANNELS, RENDER_SAMPLE_RATE};
use crate::error::{EngineError, Result};

/// Frames handed to the MP3 encoder per call
pub const MP3_BLOCK_FRAMES: usize = 1152;

/// Bit depth of every integer output format
pub const OUTPUT_BITS: u16 = 16;

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_BYTES: usize = 44;

/// Convert a float sample to 16-bit PCM, clamping out-of-range input
#[inline]
pub fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Interleave and quantize a planar buffer
pub fn to_i16_interleaved(buffer: &AudioBuffer) -> Vec<i16> {
    buffer.to_interleaved().into_iter().map(float_to_i16).collect()
}

fn encoder_error(format: &'static str, reason: impl Into<String>) -> EngineError {
    EngineError::Encoder {
        format,
        reason: reason.into(),
    }
}

/// WAV and MP3 output is fixed at the render rate; anything else would
/// play back at the wrong speed
fn check_render_rate(format: &'static str, buffer: &AudioBuffer) -> Result<()> {
    if buffer.sample_rate != RENDER_SAMPLE_RATE {
        return Err(encoder_error(
            format,
            format!(
                "buffer is at {} Hz, output must be {} Hz",
                buffer.sample_rate, RENDER_SAMPLE_RATE
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// WAV
// ============================================================================

/// Encode a stereo buffer as 16-bit little-endian PCM WAV
///
/// The output is a 44-byte header followed by interleaved samples.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    if buffer.channels() != RENDER_CHANNELS {
        return Err(encoder_error(
            "WAV",
            format!("expected {} channels, got {}", RENDER_CHANNELS, buffer.channels()),
        ));
    }
    check_render_rate("WAV", buffer)?;

    let spec = WavSpec {
        channels: RENDER_CHANNELS as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: OUTPUT_BITS,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        WAV_HEADER_BYTES + buffer.len() * RENDER_CHANNELS * 2,
    ));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| encoder_error("WAV", e.to_string()))?;
        {
            let mut samples = writer.get_i16_writer((buffer.len() * RENDER_CHANNELS) as u32);
            for frame in 0..buffer.len() {
                for channel in &buffer.samples {
                    samples.write_sample(float_to_i16(channel[frame]));
                }
            }
            samples
                .flush()
                .map_err(|e| encoder_error("WAV", e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| encoder_error("WAV", e.to_string()))?;
    }

    let bytes = cursor.into_inner();
    debug!(frames = buffer.len(), bytes = bytes.len(), "Encoded WAV");
    Ok(bytes)
}

// ============================================================================
// MP3
// ============================================================================

#[cfg(feature = "mp3")]
fn mp3_bitrate(kbps: u32) -> Result<mp3lame_encoder::Bitrate> {
    use mp3lame_encoder::Bitrate;

    Ok(match kbps {
        64 => Bitrate::Kbps64,
        96 => Bitrate::Kbps96,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(EngineError::UnsupportedFormat {
                format: format!("MP3 at {} kbps", other),
            })
        }
    })
}

/// Encode a stereo buffer as constant-bitrate MP3
///
/// Samples are fed in blocks of [`MP3_BLOCK_FRAMES`] and the encoder is
/// flushed at the end.
#[cfg(feature = "mp3")]
pub fn encode_mp3(buffer: &AudioBuffer, bitrate_kbps: u32) -> Result<Vec<u8>> {
    use mp3lame_encoder::{Builder, FlushNoGap, InterleavedPcm, Quality};

    if buffer.channels() != RENDER_CHANNELS {
        return Err(encoder_error(
            "MP3",
            format!("expected {} channels, got {}", RENDER_CHANNELS, buffer.channels()),
        ));
    }
    check_render_rate("MP3", buffer)?;

    let mut builder = Builder::new().ok_or_else(|| encoder_error("MP3", "cannot create encoder"))?;
    builder
        .set_num_channels(RENDER_CHANNELS as u8)
        .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;
    builder
        .set_sample_rate(buffer.sample_rate)
        .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;
    builder
        .set_brate(mp3_bitrate(bitrate_kbps)?)
        .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;
    let mut encoder = builder
        .build()
        .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;

    let pcm = to_i16_interleaved(buffer);
    let mut output: Vec<u8> = Vec::new();
    for block in pcm.chunks(MP3_BLOCK_FRAMES * RENDER_CHANNELS) {
        output.reserve(mp3lame_encoder::max_required_buffer_size(
            block.len() / RENDER_CHANNELS,
        ));
        let written = encoder
            .encode(InterleavedPcm(block), output.spare_capacity_mut())
            .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;
        // SAFETY: the encoder initialised `written` bytes of spare capacity
        unsafe {
            output.set_len(output.len() + written);
        }
    }

    output.reserve(mp3lame_encoder::max_required_buffer_size(MP3_BLOCK_FRAMES));
    let flushed = encoder
        .flush::<FlushNoGap>(output.spare_capacity_mut())
        .map_err(|e| encoder_error("MP3", format!("{:?}", e)))?;
    // SAFETY: as above, for the flushed tail
    unsafe {
        output.set_len(output.len() + flushed);
    }

    debug!(frames = buffer.len(), bytes = output.len(), bitrate_kbps, "Encoded MP3");
    Ok(output)
}

// ============================================================================
// FLAC
// ============================================================================

/// Sample layouts accepted by the FLAC encoder
#[derive(Debug, Clone, Copy)]
pub enum PcmInput<'a> {
    /// One slice per channel
    Planar(&'a [Vec<f32>]),
    /// Frames of `channels` consecutive samples
    Interleaved { samples: &'a [f32], channels: usize },
}

impl<'a> PcmInput<'a> {
    pub fn channels(&self) -> usize {
        match self {
            PcmInput::Planar(channels) => channels.len(),
            PcmInput::Interleaved { channels, .. } => *channels,
        }
    }

    fn to_interleaved_i32(self) -> Result<Vec<i32>> {
        match self {
            PcmInput::Planar(channels) => {
                let frames = channels.first().map_or(0, Vec::len);
                if channels.iter().any(|ch| ch.len() != frames) {
                    return Err(encoder_error("FLAC", "planar channels differ in length"));
                }
                let mut out = Vec::with_capacity(frames * channels.len());
                for frame in 0..frames {
                    out.extend(channels.iter().map(|ch| float_to_i16(ch[frame]) as i32));
                }
                Ok(out)
            }
            PcmInput::Interleaved { samples, channels } => {
                if channels == 0 || samples.len() % channels != 0 {
                    return Err(encoder_error(
                        "FLAC",
                        format!("{} samples do not fill {} channels", samples.len(), channels),
                    ));
                }
                Ok(samples.iter().map(|s| float_to_i16(*s) as i32).collect())
            }
        }
    }
}

impl<'a> From<&'a AudioBuffer> for PcmInput<'a> {
    fn from(buffer: &'a AudioBuffer) -> Self {
        PcmInput::Planar(&buffer.samples)
    }
}

/// Encode 16-bit FLAC from planar or interleaved input
pub fn encode_flac(input: PcmInput<'_>, sample_rate: u32, block_size: usize) -> Result<Vec<u8>> {
    use flacenc::bitsink::ByteSink;
    use flacenc::component::BitRepr;
    use flacenc::error::Verify;
    use flacenc::source::MemSource;

    let channels = input.channels();
    if !(1..=8).contains(&channels) {
        return Err(EngineError::UnsupportedFormat {
            format: format!("FLAC with {} channels", channels),
        });
    }
    let samples = input.to_interleaved_i32()?;

    let mut config = flacenc::config::Encoder::default();
    config.block_size = block_size;
    let config = config
        .into_verified()
        .map_err(|(_, e)| encoder_error("FLAC", format!("invalid configuration: {:?}", e)))?;

    let source = MemSource::from_samples(
        &samples,
        channels,
        OUTPUT_BITS as usize,
        sample_rate as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| encoder_error("FLAC", format!("{:?}", e)))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| encoder_error("FLAC", format!("{:?}", e)))?;

    debug!(samples = samples.len(), bytes = sink.as_slice().len(), "Encoded FLAC");
    Ok(sink.as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;

    fn ramp(frames: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
        for i in 0..frames {
            let value = (i as f32 / frames as f32) * 2.0 - 1.0;
            buffer.samples[0][i] = value;
            buffer.samples[1][i] = -value;
        }
        buffer
    }

    #[test]
    fn test_float_to_i16() {
        assert_eq!(float_to_i16(0.0), 0);
        assert_eq!(float_to_i16(1.0), 32767);
        assert_eq!(float_to_i16(-1.0), -32767);
        assert_eq!(float_to_i16(4.0), 32767);
        assert_eq!(float_to_i16(-4.0), -32767);
        assert_eq!(float_to_i16(0.5), 16384);
    }

    #[test]
    fn test_wav_rejects_buffer_at_other_rate() {
        let buffer = AudioBuffer::with_sample_rate(480, ChannelLayout::Stereo, 48000);
        let err = encode_wav(&buffer).unwrap_err();
        assert_eq!(err.error_code(), "ENCODER_FAILED");
        assert!(err.to_string().contains("48000"));
    }

    #[test]
    fn test_wav_header_layout() {
        let buffer = ramp(100);
        let bytes = encode_wav(&buffer).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_BYTES + 100 * 4);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(&bytes[36..40], b"data");

        let riff_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(riff_size as usize, 36 + 100 * 4);
        let byte_rate = u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        assert_eq!(byte_rate, 44100 * 4);
        let block_align = u16::from_le_bytes([bytes[32], bytes[33]]);
        assert_eq!(block_align, 4);
    }

    #[test]
    fn test_wav_rejects_mono() {
        let buffer = AudioBuffer::new(10, ChannelLayout::Mono);
        let err = encode_wav(&buffer).unwrap_err();
        assert_eq!(err.error_code(), "ENCODER_FAILED");
    }

    #[test]
    fn test_flac_accepts_both_layouts() {
        let buffer = ramp(4096);
        let planar = encode_flac(PcmInput::from(&buffer), 44100, 4096).unwrap();
        let interleaved = buffer.to_interleaved();
        let packed = encode_flac(
            PcmInput::Interleaved {
                samples: &interleaved,
                channels: 2,
            },
            44100,
            4096,
        )
        .unwrap();
        assert_eq!(&planar[0..4], b"fLaC");
        assert_eq!(planar, packed);
    }

    #[test]
    fn test_flac_rejects_ragged_input() {
        let samples = [0.0_f32; 5];
        let result = encode_flac(
            PcmInput::Interleaved {
                samples: &samples,
                channels: 2,
            },
            44100,
            4096,
        );
        assert!(result.is_err());
    }

    #[cfg(feature = "mp3")]
    #[test]
    fn test_mp3_produces_frames() {
        let bytes = encode_mp3(&ramp(44100), 160).unwrap();
        assert!(!bytes.is_empty());
        assert!(encode_mp3(&ramp(10), 100).is_err());
    }
}
