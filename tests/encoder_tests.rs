//! Encoder Tests
//!
//! Output formats decoded back through independent readers.

use std::io::Cursor;

use pretty_assertions::assert_eq;

use automix::engine::encode::{to_i16_interleaved, WAV_HEADER_BYTES};
use automix::engine::{encode_flac, encode_wav, float_to_i16, ChannelLayout, PcmInput};
use automix::AudioBuffer;

/// Helper to create a stereo test signal with distinct channels
fn stereo_signal(frames: usize) -> AudioBuffer {
    let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
    for i in 0..frames {
        let t = i as f32 / 44100.0;
        buffer.samples[0][i] = 0.8 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        buffer.samples[1][i] = 0.3 * (2.0 * std::f32::consts::PI * 97.0 * t).cos();
    }
    buffer
}

#[test]
fn test_wav_round_trip_within_quantization() {
    let buffer = stereo_signal(10_000);
    let bytes = encode_wav(&buffer).unwrap();
    assert_eq!(bytes.len(), WAV_HEADER_BYTES + 10_000 * 4);

    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 16);

    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, to_i16_interleaved(&buffer));

    for (i, sample) in decoded.iter().enumerate() {
        let original = buffer.samples[i % 2][i / 2];
        let restored = *sample as f32 / i16::MAX as f32;
        assert!((original - restored).abs() <= 1.0 / i16::MAX as f32);
    }
}

#[test]
fn test_wav_clips_out_of_range_samples() {
    let mut buffer = AudioBuffer::new(4, ChannelLayout::Stereo);
    buffer.samples[0] = vec![1.5, -1.5, 0.999_99, -0.5];
    buffer.samples[1] = vec![0.0; 4];

    let bytes = encode_wav(&buffer).unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let left: Vec<i16> = reader
        .samples::<i16>()
        .map(|s| s.unwrap())
        .step_by(2)
        .collect();
    assert_eq!(left, vec![32767, -32767, 32767, float_to_i16(-0.5)]);
}

#[test]
fn test_empty_wav_is_header_only() {
    let buffer = AudioBuffer::new(0, ChannelLayout::Stereo);
    let bytes = encode_wav(&buffer).unwrap();
    assert_eq!(bytes.len(), WAV_HEADER_BYTES);
}

#[test]
fn test_flac_planar_and_interleaved_agree() {
    let buffer = stereo_signal(20_000);
    let interleaved = buffer.to_interleaved();

    let planar = encode_flac(PcmInput::from(&buffer), 44100, 4096).unwrap();
    let packed = encode_flac(
        PcmInput::Interleaved {
            samples: &interleaved,
            channels: 2,
        },
        44100,
        4096,
    )
    .unwrap();

    assert_eq!(&planar[..4], b"fLaC");
    assert_eq!(planar, packed);
    // lossless but compressed
    assert!(planar.len() < interleaved.len() * 2);
}

#[test]
fn test_flac_rejects_bad_channel_counts() {
    let none: Vec<Vec<f32>> = Vec::new();
    let err = encode_flac(PcmInput::Planar(&none), 44100, 4096).unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
}

#[cfg(feature = "mp3")]
#[test]
fn test_mp3_stream_starts_with_frame_sync() {
    use automix::engine::encode_mp3;

    let bytes = encode_mp3(&stereo_signal(44100), 160).unwrap();
    let sync = bytes
        .windows(2)
        .position(|w| w[0] == 0xFF && (w[1] & 0xE0) == 0xE0);
    assert!(sync.is_some());
    // one second at 160 kbps is about 20 kB
    assert!(bytes.len() > 15_000 && bytes.len() < 25_000, "{} bytes", bytes.len());
}
