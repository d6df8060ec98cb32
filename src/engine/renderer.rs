//! Offline renderer
//!
//! Renders a whole project into one stereo buffer and wraps the result in
//! the output formats. Each call builds its own context and graph and
//! drops both before returning; nothing is shared between renders.
//!
//! A render either produces the complete buffer or fails. Files are written
//! under a temporary name and renamed into place, so a failed export never
//! leaves a partial file at the target path.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span};
use uuid::Uuid;

use super::buffer::AudioBuffer;
use super::clips::{ClipResolver, ClipSource};
use super::context::AudioContext;
use super::encode::{encode_flac, encode_wav, float_to_i16, PcmInput};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{schedule_clip, ClipLayer, PassOptions, PlayWindow, ProjectGraph};
use crate::project::{Clip, ClipTransform, Project, TempoMap};

/// Output file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Wav,
    #[cfg(feature = "mp3")]
    Mp3,
    Flac,
}

impl OutputFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_name(&extension)
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "wav" => Ok(OutputFormat::Wav),
            #[cfg(feature = "mp3")]
            "mp3" => Ok(OutputFormat::Mp3),
            "flac" => Ok(OutputFormat::Flac),
            other => Err(EngineError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            #[cfg(feature = "mp3")]
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Flac => "flac",
        }
    }
}

/// Length of a full render: the project plus one trailing measure
pub fn render_duration(project: &Project, tempo_map: &TempoMap) -> f64 {
    tempo_map.measure_to_time(project.length + 1.0)
}

/// Render every track of `project` into a stereo buffer
///
/// The metronome is muted and, when configured, the export limiter sits on
/// the master bus.
pub fn render_buffer(
    project: &Project,
    source: &dyn ClipSource,
    config: &EngineConfig,
) -> Result<AudioBuffer> {
    let span = info_span!("render", tracks = project.tracks.len());
    let _enter = span.enter();

    project.validate()?;
    let started = Instant::now();
    let tempo_map = TempoMap::from_project(project);
    let duration = render_duration(project, &tempo_map);
    info!(measures = project.length, duration_secs = duration, "Starting render");

    let mut context = AudioContext::offline(config, duration)?;
    let mut resolver = ClipResolver::new(
        source,
        &project.transformed_clips,
        &tempo_map,
        context.sample_rate(),
    );
    let mut graph = ProjectGraph::assemble(
        project,
        &tempo_map,
        &mut resolver,
        &context,
        config,
        PlayWindow::new(0.0, duration, 0.0),
        &PassOptions::render(config),
    )?;

    let buffer = context.start_rendering(&mut graph)?;
    info!(
        frames = buffer.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Render complete"
    );
    Ok(buffer)
}

/// Render and encode as 16-bit WAV
pub fn render_wav(
    project: &Project,
    source: &dyn ClipSource,
    config: &EngineConfig,
) -> Result<Vec<u8>> {
    let buffer = render_buffer(project, source, config)?;
    encode_wav(&buffer)
}

/// Render and encode as MP3 at the configured bitrate
#[cfg(feature = "mp3")]
pub fn render_mp3(
    project: &Project,
    source: &dyn ClipSource,
    config: &EngineConfig,
) -> Result<Vec<u8>> {
    let buffer = render_buffer(project, source, config)?;
    super::encode::encode_mp3(&buffer, config.mp3_bitrate_kbps)
}

/// Render and encode as 16-bit FLAC
pub fn render_flac(
    project: &Project,
    source: &dyn ClipSource,
    config: &EngineConfig,
) -> Result<Vec<u8>> {
    let buffer = render_buffer(project, source, config)?;
    encode_flac(
        PcmInput::from(&buffer),
        buffer.sample_rate,
        config.flac_compression_block_size,
    )
}

/// Render in `format`
pub fn render_to_bytes(
    project: &Project,
    source: &dyn ClipSource,
    config: &EngineConfig,
    format: OutputFormat,
) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Wav => render_wav(project, source, config),
        #[cfg(feature = "mp3")]
        OutputFormat::Mp3 => render_mp3(project, source, config),
        OutputFormat::Flac => render_flac(project, source, config),
    }
}

/// Render straight to a file, replacing it only once encoding succeeded
pub fn render_to_file(
    project: &Project,
    source: &dyn ClipSource,
    config: &EngineConfig,
    format: OutputFormat,
    path: &Path,
) -> Result<()> {
    let bytes = render_to_bytes(project, source, config, format)?;
    write_atomic(path, &bytes)
}

/// Write bytes next to `path` and rename them into place
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| EngineError::UnsupportedFormat {
            format: format!("output path {}", path.display()),
        })?;
    let temp: PathBuf = path.with_file_name(format!(".{}.{}.part", file_name, Uuid::new_v4()));

    fs::write(&temp, bytes)?;
    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote render");
    Ok(())
}

/// Mix a bare clip list with no effects
///
/// Used to feed single-track analysis. The output runs one measure past
/// the end of the last clip.
pub fn merge_clips(
    clips: &[Clip],
    tempo_map: &TempoMap,
    source: &dyn ClipSource,
    config: &EngineConfig,
) -> Result<AudioBuffer> {
    if clips.is_empty() {
        return Err(EngineError::InvalidProject {
            reason: "no clips to merge".to_string(),
        });
    }

    let no_transforms: IndexMap<String, ClipTransform> = IndexMap::new();
    let mut resolver = ClipResolver::new(source, &no_transforms, tempo_map, config.sample_rate);

    let mut placed = Vec::with_capacity(clips.len());
    let mut length = 0.0_f64;
    for clip in clips {
        let audio = resolver.clip_audio(clip)?;
        let start = tempo_map.measure_to_time(clip.start_measure);
        let end_measure = match clip.measure_length() {
            Some(measures) => clip.start_measure + measures,
            None => tempo_map.time_to_measure(start + audio.duration_secs()),
        };
        length = length.max(end_measure);
        placed.push((audio, start));
    }

    let duration = tempo_map.measure_to_time(length + 1.0);
    let mut context = AudioContext::offline(config, duration)?;
    let window = PlayWindow::new(0.0, duration, 0.0);
    let mut layer = ClipLayer::new();
    for (audio, start) in placed {
        if let Some(scheduled) = schedule_clip(&context, audio, start, &window) {
            layer.push(scheduled);
        }
    }

    debug!(clips = layer.len(), duration_secs = duration, "Merging clips");
    context.start_rendering(&mut layer)
}

/// SHA-256 of the 16-bit interleaved PCM, as lowercase hex
pub fn pcm_checksum(buffer: &AudioBuffer) -> String {
    let mut hasher = Sha256::new();
    for sample in buffer.to_interleaved() {
        hasher.update(float_to_i16(sample).to_le_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Run [`render_buffer`] on the blocking pool
#[cfg(feature = "async")]
pub async fn render_buffer_async(
    project: std::sync::Arc<Project>,
    source: std::sync::Arc<dyn ClipSource>,
    config: EngineConfig,
) -> Result<AudioBuffer> {
    tokio::task::spawn_blocking(move || render_buffer(&project, source.as_ref(), &config))
        .await
        .map_err(|err| EngineError::ContextAllocation {
            reason: format!("render task failed: {}", err),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::clips::MemoryClipSource;
    use tempfile::tempdir;

    fn tone(frames: usize, value: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
        for channel in buffer.samples.iter_mut() {
            channel.fill(value);
        }
        buffer
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::from_name("wav").unwrap(), OutputFormat::Wav);
        assert_eq!(
            OutputFormat::from_path(Path::new("mix.FLAC")).unwrap(),
            OutputFormat::Flac
        );
        assert!(OutputFormat::from_name("ogg").is_err());
    }

    #[test]
    fn test_render_length_includes_trailing_measure() {
        let project = Project::new(2.0, 120.0);
        let buffer = render_buffer(&project, &MemoryClipSource::new(), &EngineConfig::default())
            .unwrap();
        // measures 1..3 at 120 BPM, 2 s each
        assert_eq!(buffer.len(), 4 * 44100);
    }

    #[test]
    fn test_merge_clips_places_each_clip() {
        let source = MemoryClipSource::new().with_clip("A", tone(100, 0.5), None);
        let tempo_map = TempoMap::constant(120.0);
        let clips = [Clip::new("A", 1, 1.0), Clip::new("A", 1, 2.0)];
        let merged = merge_clips(&clips, &tempo_map, &source, &EngineConfig::default()).unwrap();

        assert_eq!(merged.channel(0)[0], 0.5);
        assert_eq!(merged.channel(0)[100], 0.0);
        assert_eq!(merged.channel(1)[2 * 44100], 0.5);
        assert!(merge_clips(&[], &tempo_map, &source, &EngineConfig::default()).is_err());
    }

    #[test]
    fn test_failed_render_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mix.wav");
        let mut project = Project::new(1.0, 120.0);
        project.add_clip(Clip::new("MISSING", 1, 1.0));

        let result = render_to_file(
            &project,
            &MemoryClipSource::new(),
            &EngineConfig::default(),
            OutputFormat::Wav,
            &path,
        );
        assert!(result.is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_atomic_replaces_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_checksum_is_stable() {
        let buffer = tone(64, 0.25);
        assert_eq!(pcm_checksum(&buffer), pcm_checksum(&buffer.clone()));
        assert_ne!(pcm_checksum(&buffer), pcm_checksum(&tone(64, 0.5)));
        assert_eq!(pcm_checksum(&buffer).len(), 64);
    }
}
