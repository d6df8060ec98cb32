//! Clip audio
//!
//! A [`ClipSource`] turns a source key into decoded audio. The
//! [`ClipResolver`] sits on top of one for the length of a pass: it applies
//! the project's slices and stretches, converts everything to the context
//! rate in stereo, and cuts each placed clip to its source range.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::{SampleFormat, WavReader};
use indexmap::IndexMap;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{EngineError, Result};
use crate::project::tempo::BEATS_PER_MEASURE;
use crate::project::{Clip, ClipTransform, TempoMap};

/// Transforms may name other transforms; this bounds the chain
const MAX_TRANSFORM_DEPTH: usize = 16;

/// Decoded source audio and its natural tempo, if it has one
#[derive(Debug, Clone, PartialEq)]
pub struct ClipBuffer {
    pub buffer: AudioBuffer,
    pub tempo: Option<f64>,
}

impl ClipBuffer {
    pub fn new(buffer: AudioBuffer, tempo: Option<f64>) -> Self {
        Self { buffer, tempo }
    }
}

/// Supplies decoded audio for source keys
pub trait ClipSource: Send + Sync {
    /// Load the audio for `key`, or `ClipNotFound`
    fn load(&self, key: &str) -> Result<ClipBuffer>;
}

// ============================================================================
// In-memory source
// ============================================================================

/// Clip source backed by buffers registered in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryClipSource {
    clips: HashMap<String, ClipBuffer>,
}

impl MemoryClipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, buffer: AudioBuffer, tempo: Option<f64>) {
        self.clips
            .insert(key.to_string(), ClipBuffer::new(buffer, tempo));
    }

    pub fn with_clip(mut self, key: &str, buffer: AudioBuffer, tempo: Option<f64>) -> Self {
        self.insert(key, buffer, tempo);
        self
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl ClipSource for MemoryClipSource {
    fn load(&self, key: &str) -> Result<ClipBuffer> {
        self.clips
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::ClipNotFound {
                key: key.to_string(),
            })
    }
}

// ============================================================================
// Directory source
// ============================================================================

/// Clip source reading `*.wav` files below a root directory
///
/// The key of a file is its stem, so `drums/KICK_1.wav` is `KICK_1`.
#[derive(Debug, Clone)]
pub struct DirectoryClipSource {
    root: PathBuf,
    files: HashMap<String, PathBuf>,
    tempos: HashMap<String, f64>,
}

impl DirectoryClipSource {
    /// Index every WAV file under `root`
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("clip directory {} does not exist", root.display()),
            )));
        }

        let mut files = HashMap::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let path = entry.path();
            let is_wav = path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"));
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if !is_wav {
                continue;
            }
            if let Some(previous) = files.insert(stem.clone(), path.to_path_buf()) {
                warn!(key = %stem, shadowed = %previous.display(), "Duplicate clip key");
            }
        }

        debug!(root = %root.display(), clips = files.len(), "Indexed clip directory");
        Ok(Self {
            root: root.to_path_buf(),
            files,
            tempos: HashMap::new(),
        })
    }

    /// Record the natural tempo of a clip
    pub fn set_tempo(&mut self, key: &str, tempo: f64) {
        self.tempos.insert(key.to_string(), tempo);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indexed keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.files.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl ClipSource for DirectoryClipSource {
    fn load(&self, key: &str) -> Result<ClipBuffer> {
        let path = self.files.get(key).ok_or_else(|| EngineError::ClipNotFound {
            key: key.to_string(),
        })?;
        let buffer = read_wav(path)?;
        Ok(ClipBuffer::new(buffer, self.tempos.get(key).copied()))
    }
}

/// Decode a WAV file into a planar buffer at its own sample rate
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path).map_err(|e| EngineError::InvalidAudio {
        reason: format!("Failed to open WAV file {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
        EngineError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", spec.channels),
        }
    })?;
    let interleaved = read_samples(reader, spec.bits_per_sample, spec.sample_format)?;
    AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)
}

fn read_samples<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |e: hound::Error| EngineError::InvalidAudio {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, bits) => Err(EngineError::UnsupportedFormat {
            format: format!("{}-bit integer audio", bits),
        }),
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Frames covered by `measures` at `tempo`
fn measures_to_frames(measures: f64, tempo: f64, sample_rate: u32) -> usize {
    let seconds = measures * BEATS_PER_MEASURE * 60.0 / tempo;
    (seconds * sample_rate as f64).round().max(0.0) as usize
}

/// Resolves clip keys to stereo audio at the context rate for one pass
pub struct ClipResolver<'a> {
    source: &'a dyn ClipSource,
    transforms: &'a IndexMap<String, ClipTransform>,
    tempo_map: &'a TempoMap,
    sample_rate: u32,
    cache: HashMap<String, Arc<ClipBuffer>>,
}

impl<'a> ClipResolver<'a> {
    pub fn new(
        source: &'a dyn ClipSource,
        transforms: &'a IndexMap<String, ClipTransform>,
        tempo_map: &'a TempoMap,
        sample_rate: u32,
    ) -> Self {
        Self {
            source,
            transforms,
            tempo_map,
            sample_rate,
            cache: HashMap::new(),
        }
    }

    /// Audio for a key after applying any transform registered under it
    pub fn resolve(&mut self, key: &str) -> Result<Arc<ClipBuffer>> {
        self.resolve_depth(key, 0)
    }

    fn resolve_depth(&mut self, key: &str, depth: usize) -> Result<Arc<ClipBuffer>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(Arc::clone(cached));
        }
        if depth > MAX_TRANSFORM_DEPTH {
            return Err(EngineError::InvalidProject {
                reason: format!("clip transform chain for '{}' is too deep", key),
            });
        }

        let transforms = self.transforms;
        let resolved = match transforms.get(key) {
            Some(ClipTransform::Slice {
                source_key,
                start,
                end,
            }) => {
                let source = self.resolve_depth(source_key, depth + 1)?;
                self.slice(key, &source, *start, *end)?
            }
            Some(ClipTransform::Stretch { source_key, factor }) => {
                let source = self.resolve_depth(source_key, depth + 1)?;
                stretch(key, &source, *factor)?
            }
            None => {
                let loaded = self.source.load(key)?;
                if let Some(tempo) = loaded.tempo {
                    if !(tempo.is_finite() && tempo > 0.0) {
                        return Err(EngineError::InvalidAudio {
                            reason: format!("clip '{}' reports tempo {} BPM", key, tempo),
                            source: None,
                        });
                    }
                }
                ClipBuffer::new(
                    loaded.buffer.to_stereo().resample(self.sample_rate),
                    loaded.tempo,
                )
            }
        };

        debug!(key, frames = resolved.buffer.len(), "Resolved clip");
        let resolved = Arc::new(resolved);
        self.cache.insert(key.to_string(), Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Cut `[start, end)` measures (1-based) at the source's tempo
    fn slice(&self, key: &str, source: &ClipBuffer, start: f64, end: f64) -> Result<ClipBuffer> {
        let tempo = source.tempo.unwrap_or_else(|| self.tempo_map.initial_tempo());
        let from = measures_to_frames(start - 1.0, tempo, self.sample_rate);
        let to = measures_to_frames(end - 1.0, tempo, self.sample_rate);
        if end <= start || to > source.buffer.len() {
            return Err(EngineError::InvalidProject {
                reason: format!(
                    "slice '{}' of measures {}..{} does not fit its source",
                    key, start, end
                ),
            });
        }
        Ok(ClipBuffer::new(
            source.buffer.slice_frames(from, to - from),
            source.tempo,
        ))
    }

    /// Tempo used to convert measures inside a clip's source
    fn clip_tempo(&self, clip: &Clip, source: &ClipBuffer) -> f64 {
        source
            .tempo
            .unwrap_or_else(|| self.tempo_map.tempo_at_measure(clip.start_measure))
    }

    /// Audio a placed clip plays: its source range, looped when asked
    pub fn clip_audio(&mut self, clip: &Clip) -> Result<Arc<AudioBuffer>> {
        let source = self.resolve(&clip.source_key)?;
        let tempo = self.clip_tempo(clip, &source);
        let total = source.buffer.len();

        let from = measures_to_frames(clip.source_in_start - 1.0, tempo, self.sample_rate);
        if from >= total {
            return Err(EngineError::InvalidProject {
                reason: format!(
                    "clip '{}' starts past the end of its source",
                    clip.source_key
                ),
            });
        }

        let wanted = match clip.measure_length() {
            Some(measures) => measures_to_frames(measures, tempo, self.sample_rate),
            None => total - from,
        };

        if !clip.looped || wanted <= total - from {
            return Ok(Arc::new(
                source.buffer.slice_frames(from, wanted.min(total - from)),
            ));
        }

        // loops restart from the top of the source
        let mut audio = AudioBuffer::with_sample_rate(wanted, ChannelLayout::Stereo, self.sample_rate);
        for (dst, src) in audio.samples.iter_mut().zip(&source.buffer.samples) {
            let first = total - from;
            dst[..first].copy_from_slice(&src[from..]);
            for (i, sample) in dst[first..].iter_mut().enumerate() {
                *sample = src[i % total];
            }
        }
        Ok(Arc::new(audio))
    }
}

/// Varispeed stretch: play the source `factor` times as long
fn stretch(key: &str, source: &ClipBuffer, factor: f64) -> Result<ClipBuffer> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(EngineError::InvalidProject {
            reason: format!("stretch '{}' has invalid factor {}", key, factor),
        });
    }
    let length = (source.buffer.len() as f64 * factor).round() as usize;
    Ok(ClipBuffer::new(
        source.buffer.resample_to_len(length),
        source.tempo.map(|tempo| tempo / factor),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::TempDir;

    fn ramp(frames: usize, sample_rate: u32) -> AudioBuffer {
        let mut buffer = AudioBuffer::with_sample_rate(frames, ChannelLayout::Stereo, sample_rate);
        for ch in 0..2 {
            for (i, sample) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *sample = i as f32 / frames as f32;
            }
        }
        buffer
    }

    fn write_wav(path: &Path, frames: usize, channels: u16) {
        let spec = WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample((i % 1000) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_non_positive_source_tempo_is_rejected() {
        let transforms = IndexMap::new();
        let tempo_map = TempoMap::constant(120.0);
        for tempo in [0.0, -90.0, f64::NAN] {
            let source = MemoryClipSource::new().with_clip("LOOP", ramp(1000, 44100), Some(tempo));
            let mut resolver = ClipResolver::new(&source, &transforms, &tempo_map, 44100);
            let err = resolver.clip_audio(&Clip::new("LOOP", 1, 1.0)).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_AUDIO");
            assert!(err.is_data_error());
        }
    }

    #[test]
    fn test_directory_source_indexes_by_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("drums")).unwrap();
        write_wav(&dir.path().join("drums").join("KICK.wav"), 100, 1);
        write_wav(&dir.path().join("BASS.WAV"), 50, 2);
        std::fs::write(dir.path().join("notes.txt"), "not audio").unwrap();

        let source = DirectoryClipSource::open(dir.path()).unwrap();
        assert_eq!(source.keys(), vec!["BASS", "KICK"]);

        let kick = source.load("KICK").unwrap();
        assert_eq!(kick.buffer.channels(), 1);
        assert_eq!(kick.buffer.len(), 100);
        assert!(kick.tempo.is_none());

        let err = source.load("SNARE").unwrap_err();
        assert_eq!(err.error_code(), "CLIP_NOT_FOUND");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(DirectoryClipSource::open(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_resolver_converts_to_stereo_at_context_rate() {
        let mono = AudioBuffer::with_sample_rate(22050, ChannelLayout::Mono, 22050);
        let source = MemoryClipSource::new().with_clip("PAD", mono, None);
        let transforms = IndexMap::new();
        let tempo_map = TempoMap::constant(120.0);
        let mut resolver = ClipResolver::new(&source, &transforms, &tempo_map, 44100);

        let pad = resolver.resolve("PAD").unwrap();
        assert_eq!(pad.buffer.channels(), 2);
        assert_eq!(pad.buffer.len(), 44100);
        assert_eq!(pad.buffer.sample_rate, 44100);
    }

    #[test]
    fn test_slice_uses_natural_tempo() {
        // two measures at 60 BPM = 8 seconds
        let source = MemoryClipSource::new().with_clip("LOOP", ramp(8 * 44100, 44100), Some(60.0));
        let mut transforms = IndexMap::new();
        transforms.insert(
            "LOOP_SLICE".to_string(),
            ClipTransform::Slice {
                source_key: "LOOP".to_string(),
                start: 2.0,
                end: 3.0,
            },
        );
        let tempo_map = TempoMap::constant(120.0);
        let mut resolver = ClipResolver::new(&source, &transforms, &tempo_map, 44100);

        let slice = resolver.resolve("LOOP_SLICE").unwrap();
        assert_eq!(slice.buffer.len(), 4 * 44100);
        assert_eq!(slice.buffer.channel(0)[0], 0.5);

        transforms.insert(
            "TOO_LONG".to_string(),
            ClipTransform::Slice {
                source_key: "LOOP".to_string(),
                start: 1.0,
                end: 4.0,
            },
        );
        let mut resolver = ClipResolver::new(&source, &transforms, &tempo_map, 44100);
        assert!(resolver.resolve("TOO_LONG").is_err());
    }

    #[test]
    fn test_stretch_scales_length() {
        let source = MemoryClipSource::new().with_clip("HIT", ramp(1000, 44100), Some(100.0));
        let mut transforms = IndexMap::new();
        transforms.insert(
            "HIT_SLOW".to_string(),
            ClipTransform::Stretch {
                source_key: "HIT".to_string(),
                factor: 2.0,
            },
        );
        let tempo_map = TempoMap::default();
        let mut resolver = ClipResolver::new(&source, &transforms, &tempo_map, 44100);
        let slow = resolver.resolve("HIT_SLOW").unwrap();
        assert_eq!(slow.buffer.len(), 2000);
        assert_eq!(slow.tempo, Some(50.0));
    }

    #[test]
    fn test_clip_audio_trims_and_loops() {
        // one measure at 120 BPM is two seconds
        let source = MemoryClipSource::new().with_clip("BEAT", ramp(2 * 44100, 44100), None);
        let transforms = IndexMap::new();
        let tempo_map = TempoMap::constant(120.0);
        let mut resolver = ClipResolver::new(&source, &transforms, &tempo_map, 44100);

        let whole = resolver.clip_audio(&Clip::new("BEAT", 1, 1.0)).unwrap();
        assert_eq!(whole.len(), 2 * 44100);

        let half = resolver
            .clip_audio(&Clip::new("BEAT", 1, 1.0).with_source_range(1.5, 2.0))
            .unwrap();
        assert_eq!(half.len(), 44100);
        assert_eq!(half.channel(0)[0], 0.5);

        let mut looped = Clip::new("BEAT", 1, 1.0).with_source_range(1.0, 3.0);
        looped.looped = true;
        let looped = resolver.clip_audio(&looped).unwrap();
        assert_eq!(looped.len(), 4 * 44100);
        assert_eq!(looped.channel(0)[2 * 44100], 0.0);
        assert_eq!(looped.channel(0)[2 * 44100 + 10], looped.channel(0)[10]);

        let unlooped = resolver
            .clip_audio(&Clip::new("BEAT", 1, 1.0).with_source_range(1.0, 3.0))
            .unwrap();
        assert_eq!(unlooped.len(), 2 * 44100);
    }
}
