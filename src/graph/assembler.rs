//! Project Graph Assembler
//!
//! Wires a whole project for one pass:
//!
//! ```text
//! track n clips ─► track gain ─► track n effects ─┐
//!                                                  ├─► mix bus ─► track 0 effects ─► [limiter] ─┐
//! track 1 clips ─► track gain ─► track 1 effects ─┘                                             ├─► master gain ─► out
//! track 0 clips ─────────────────────────────────► metronome gain ──────────────────────────────┘
//! ```
//!
//! Clips are scheduled against a play window `[start_time, end_time)` on
//! the track timeline, with audio for `start_time` coming out at the pass's
//! output time.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::builder::{BypassSet, EffectChain, GraphBuilder, PassTiming};
use crate::config::EngineConfig;
use crate::dsp::dynamics::{Compressor, LIMITER_RATIO, LIMITER_THRESHOLD_DB};
use crate::engine::buffer::{AudioBuffer, RENDER_CHANNELS};
use crate::engine::clips::ClipResolver;
use crate::engine::context::{AudioContext, RenderSource};
use crate::engine::param::AudioParam;
use crate::error::{EngineError, Result};
use crate::project::{Clip, Project, TempoMap, MIX_TRACK};

// ============================================================================
// Pass options
// ============================================================================

/// Track-time window played by one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayWindow {
    /// Track-local start in seconds
    pub start_time: f64,
    /// Track-local end in seconds, exclusive
    pub end_time: f64,
    /// Engine time at which `start_time` is heard
    pub output_time: f64,
}

impl PlayWindow {
    pub fn new(start_time: f64, end_time: f64, output_time: f64) -> Self {
        Self {
            start_time,
            end_time,
            output_time,
        }
    }

    /// Window between two measures, heard from `output_time`
    pub fn from_measures(tempo_map: &TempoMap, start: f64, end: f64, output_time: f64) -> Self {
        Self::new(
            tempo_map.measure_to_time(start),
            tempo_map.measure_to_time(end),
            output_time,
        )
    }

    pub fn timing(&self) -> PassTiming {
        PassTiming::new(self.start_time, self.output_time)
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Per-pass switches
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Run the mix through the export limiter
    pub use_limiter: bool,
    /// Silence the metronome track
    pub mute_metronome: bool,
    /// Parameters to force-bypass, per track index
    pub bypass: HashMap<usize, BypassSet>,
}

impl PassOptions {
    /// Options for an offline export
    pub fn render(config: &EngineConfig) -> Self {
        Self {
            use_limiter: config.use_limiter_on_export,
            mute_metronome: true,
            bypass: HashMap::new(),
        }
    }

    /// Options for interactive playback
    pub fn playback(bypass: HashMap<usize, BypassSet>) -> Self {
        Self {
            use_limiter: false,
            mute_metronome: false,
            bypass,
        }
    }
}

// ============================================================================
// Clip scheduling
// ============================================================================

/// One clip placed on the engine clock
#[derive(Debug, Clone)]
pub struct ScheduledClip {
    audio: Arc<AudioBuffer>,
    /// Engine frame of the first output sample
    start_frame: u64,
    /// First source frame played
    offset: usize,
    /// Frames played
    length: usize,
}

impl ScheduledClip {
    pub fn new(audio: Arc<AudioBuffer>, start_frame: u64, offset: usize, length: usize) -> Self {
        let length = length.min(audio.len().saturating_sub(offset));
        Self {
            audio,
            start_frame,
            offset,
            length,
        }
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Add the part of this clip that falls in the block at `block_frame`
    fn mix_into(&self, block_frame: u64, out: &mut AudioBuffer) {
        let block_end = block_frame + out.len() as u64;
        let clip_end = self.start_frame + self.length as u64;
        let from = self.start_frame.max(block_frame);
        let to = clip_end.min(block_end);
        if from >= to {
            return;
        }

        let count = (to - from) as usize;
        let dst_start = (from - block_frame) as usize;
        let src_start = self.offset + (from - self.start_frame) as usize;
        for (dst, src) in out.samples.iter_mut().zip(&self.audio.samples) {
            for (d, s) in dst[dst_start..dst_start + count]
                .iter_mut()
                .zip(&src[src_start..src_start + count])
            {
                *d += *s;
            }
        }
    }
}

/// Place a clip inside a play window
///
/// Returns `None` when the clip lies wholly outside `[start_time, end_time)`.
pub fn schedule_clip(
    context: &AudioContext,
    audio: Arc<AudioBuffer>,
    clip_start: f64,
    window: &PlayWindow,
) -> Option<ScheduledClip> {
    let clip_end = clip_start + audio.duration_secs();
    if window.start_time >= clip_end || clip_start >= window.end_time {
        return None;
    }

    // never play past the end of the window
    let duration = clip_end.min(window.end_time) - clip_start;
    let sample_rate = context.sample_rate() as f64;

    let (output_time, offset, play) = if window.start_time >= clip_start {
        let offset = window.start_time - clip_start;
        (window.output_time, offset, duration - offset)
    } else {
        (
            window.output_time + (clip_start - window.start_time),
            0.0,
            duration,
        )
    };

    Some(ScheduledClip::new(
        audio,
        context.time_to_frame(output_time),
        (offset * sample_rate).round() as usize,
        (play * sample_rate).round() as usize,
    ))
}

/// Clips summed onto one bus
#[derive(Debug, Clone, Default)]
pub struct ClipLayer {
    clips: Vec<ScheduledClip>,
}

impl ClipLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clip: ScheduledClip) {
        self.clips.push(clip);
    }

    pub fn clips(&self) -> &[ScheduledClip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Overwrite `out` with the layer's audio for the block at `block_frame`
    pub fn render(&self, block_frame: u64, out: &mut AudioBuffer) {
        out.clear();
        for clip in &self.clips {
            clip.mix_into(block_frame, out);
        }
    }
}

impl RenderSource for ClipLayer {
    fn render_block(&mut self, start_time: f64, out: &mut AudioBuffer) {
        let block_frame = (start_time * out.sample_rate as f64).round() as u64;
        self.render(block_frame, out);
    }
}

// ============================================================================
// Project graph
// ============================================================================

/// Signal path of one track
#[derive(Debug)]
pub struct TrackGraph {
    index: usize,
    clips: ClipLayer,
    gain: AudioParam,
    effects: EffectChain,
}

impl TrackGraph {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn clips(&self) -> &ClipLayer {
        &self.clips
    }

    pub fn effects(&self) -> &EffectChain {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectChain {
        &mut self.effects
    }

    /// Output gain; on the mix track this is the metronome level
    pub fn gain_mut(&mut self) -> &mut AudioParam {
        &mut self.gain
    }
}

/// Every node of one pass, owned together and dropped together
#[derive(Debug)]
pub struct ProjectGraph {
    sample_rate: u32,
    tracks: Vec<TrackGraph>,
    limiter: Option<Compressor>,
    master_gain: AudioParam,
    // per-block scratch
    input: AudioBuffer,
    processed: AudioBuffer,
    mix: AudioBuffer,
    master: AudioBuffer,
    gains: Vec<f32>,
    frame: Vec<f32>,
}

impl ProjectGraph {
    /// Build every track of `project` for one pass
    pub fn assemble(
        project: &Project,
        tempo_map: &TempoMap,
        resolver: &mut ClipResolver<'_>,
        context: &AudioContext,
        config: &EngineConfig,
        window: PlayWindow,
        options: &PassOptions,
    ) -> Result<Self> {
        if project.tracks.is_empty() {
            return Err(EngineError::InvalidProject {
                reason: "project has no mix track".to_string(),
            });
        }

        let no_bypass = BypassSet::new();
        let mut tracks = Vec::with_capacity(project.tracks.len());
        for (index, track) in project.tracks.iter().enumerate() {
            let bypass = options.bypass.get(&index).unwrap_or(&no_bypass);
            let builder = GraphBuilder::new(context, config, tempo_map, window.timing(), bypass);
            let effects = builder.build_track(index, track)?;

            let mut clips = ClipLayer::new();
            for clip in &track.clips {
                if let Some(scheduled) =
                    place_clip(clip, tempo_map, resolver, context, &window)?
                {
                    clips.push(scheduled);
                }
            }

            let muted = index == MIX_TRACK && options.mute_metronome;
            tracks.push(TrackGraph {
                index,
                clips,
                gain: AudioParam::new(if muted { 0.0 } else { 1.0 }),
                effects,
            });
        }

        let clip_count: usize = tracks.iter().map(|track| track.clips.len()).sum();
        info!(
            tracks = tracks.len(),
            clips = clip_count,
            limiter = options.use_limiter,
            "Assembled project graph"
        );

        let sample_rate = context.sample_rate();
        Ok(Self {
            sample_rate,
            tracks,
            limiter: options
                .use_limiter
                .then(|| Compressor::limiter(sample_rate)),
            master_gain: AudioParam::new(1.0),
            input: AudioBuffer::default(),
            processed: AudioBuffer::default(),
            mix: AudioBuffer::default(),
            master: AudioBuffer::default(),
            gains: Vec::new(),
            frame: Vec::with_capacity(RENDER_CHANNELS),
        })
    }

    pub fn tracks(&self) -> &[TrackGraph] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&TrackGraph> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut TrackGraph> {
        self.tracks.get_mut(index)
    }

    pub fn has_limiter(&self) -> bool {
        self.limiter.is_some()
    }

    /// Gain applied after everything else; used to fade a pass out
    pub fn master_gain_mut(&mut self) -> &mut AudioParam {
        &mut self.master_gain
    }

    pub fn master_gain(&self) -> &AudioParam {
        &self.master_gain
    }
}

/// Resolve and place one clip, or skip it when it is outside the window
fn place_clip(
    clip: &Clip,
    tempo_map: &TempoMap,
    resolver: &mut ClipResolver<'_>,
    context: &AudioContext,
    window: &PlayWindow,
) -> Result<Option<ScheduledClip>> {
    let clip_start = tempo_map.measure_to_time(clip.start_measure);
    if clip_start >= window.end_time {
        return Ok(None);
    }
    let audio = resolver.clip_audio(clip)?;
    let scheduled = schedule_clip(context, audio, clip_start, window);
    if let Some(scheduled) = &scheduled {
        debug!(
            key = %clip.source_key,
            track = clip.track_index,
            start_frame = scheduled.start_frame(),
            offset = scheduled.offset(),
            "Scheduled clip"
        );
    }
    Ok(scheduled)
}

/// Multiply every channel by per-frame gains
fn apply_gain(buffer: &mut AudioBuffer, gains: &[f32]) {
    for channel in &mut buffer.samples {
        for (sample, gain) in channel.iter_mut().zip(gains) {
            *sample *= gain;
        }
    }
}

impl RenderSource for ProjectGraph {
    fn render_block(&mut self, start_time: f64, out: &mut AudioBuffer) {
        let frames = out.len();
        let channels = out.channels();
        let block_frame = (start_time * self.sample_rate as f64).round() as u64;

        self.input.resize(frames, channels);
        self.processed.resize(frames, channels);
        self.mix.resize(frames, channels);
        self.master.resize(frames, channels);
        self.gains.resize(frames, 0.0);
        self.mix.clear();

        for track in self.tracks.iter_mut().filter(|t| t.index != MIX_TRACK) {
            track.clips.render(block_frame, &mut self.input);
            track.gain.fill(start_time, self.sample_rate, &mut self.gains);
            apply_gain(&mut self.input, &self.gains);
            track.effects.process(&self.input, &mut self.processed, start_time);
            self.mix.mix_from(&self.processed);
        }

        // the mix track's effects process the whole mix
        match self.tracks.iter_mut().find(|t| t.index == MIX_TRACK) {
            Some(mix_track) => {
                mix_track
                    .effects
                    .process(&self.mix, &mut self.master, start_time);
                mix_track.clips.render(block_frame, &mut self.input);
                mix_track
                    .gain
                    .fill(start_time, self.sample_rate, &mut self.gains);
                apply_gain(&mut self.input, &self.gains);
            }
            None => {
                self.master.copy_from(&self.mix);
                self.input.clear();
            }
        }

        if let Some(limiter) = &mut self.limiter {
            self.frame.resize(channels, 0.0);
            for i in 0..frames {
                for (ch, sample) in self.frame.iter_mut().enumerate() {
                    *sample = self.master.samples[ch][i];
                }
                limiter.process_frame(&mut self.frame, LIMITER_THRESHOLD_DB, LIMITER_RATIO);
                for (ch, sample) in self.frame.iter().enumerate() {
                    self.master.samples[ch][i] = *sample;
                }
            }
        }

        // metronome joins after the limiter
        self.master.mix_from(&self.input);
        self.master_gain
            .fill(start_time, self.sample_rate, &mut self.gains);
        apply_gain(&mut self.master, &self.gains);
        out.copy_from(&self.master);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::clips::MemoryClipSource;
    use crate::project::Breakpoint;

    fn constant(frames: usize, value: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
        for ch in 0..2 {
            buffer.channel_mut(ch).fill(value);
        }
        buffer
    }

    fn context() -> AudioContext {
        AudioContext::realtime(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_future_clip_starts_later() {
        let audio = Arc::new(constant(44100, 1.0));
        let window = PlayWindow::new(0.0, 10.0, 0.5);
        let clip = schedule_clip(&context(), audio, 2.0, &window).unwrap();
        assert_eq!(clip.start_frame(), (2.5 * 44100.0) as u64);
        assert_eq!(clip.offset(), 0);
        assert_eq!(clip.length(), 44100);
    }

    #[test]
    fn test_window_inside_clip_offsets_source() {
        let audio = Arc::new(constant(44100, 1.0));
        let window = PlayWindow::new(2.25, 10.0, 0.0);
        let clip = schedule_clip(&context(), audio, 2.0, &window).unwrap();
        assert_eq!(clip.start_frame(), 0);
        assert_eq!(clip.offset(), 11025);
        assert_eq!(clip.length(), 44100 - 11025);
    }

    #[test]
    fn test_clip_clamped_to_window_end() {
        let audio = Arc::new(constant(44100, 1.0));
        let window = PlayWindow::new(0.0, 0.5, 0.0);
        let clip = schedule_clip(&context(), audio, 0.0, &window).unwrap();
        assert_eq!(clip.length(), 22050);
    }

    #[test]
    fn test_clips_outside_window_are_skipped() {
        let audio = Arc::new(constant(44100, 1.0));
        let window = PlayWindow::new(2.0, 4.0, 0.0);
        // ends exactly where the window starts
        assert!(schedule_clip(&context(), Arc::clone(&audio), 1.0, &window).is_none());
        // starts exactly where the window ends
        assert!(schedule_clip(&context(), Arc::clone(&audio), 4.0, &window).is_none());
        assert!(schedule_clip(&context(), audio, 3.999, &window).is_some());
    }

    #[test]
    fn test_clip_layer_spans_blocks() {
        let mut layer = ClipLayer::new();
        layer.push(ScheduledClip::new(Arc::new(constant(100, 0.5)), 120, 0, 100));
        let mut block = AudioBuffer::new(128, ChannelLayout::Stereo);
        layer.render(0, &mut block);
        assert_eq!(block.channel(0)[119], 0.0);
        assert_eq!(block.channel(0)[120], 0.5);
        layer.render(128, &mut block);
        assert_eq!(block.channel(1)[91], 0.5);
        assert_eq!(block.channel(1)[92], 0.0);
    }

    fn one_clip_project() -> (Project, MemoryClipSource) {
        let mut project = Project::new(1.0, 120.0);
        project.add_clip(Clip::new("TONE", 1, 1.0));
        project.add_clip(Clip::new("CLICK", 0, 1.0));
        let source = MemoryClipSource::new()
            .with_clip("TONE", constant(44100, 0.25), None)
            .with_clip("CLICK", constant(100, 0.5), None);
        (project, source)
    }

    fn assemble(project: &Project, source: &MemoryClipSource, options: &PassOptions) -> ProjectGraph {
        let config = EngineConfig::default();
        let context = context();
        let tempo_map = TempoMap::from_project(project);
        let mut resolver = ClipResolver::new(source, &project.transformed_clips, &tempo_map, 44100);
        let window = PlayWindow::new(0.0, 4.0, 0.0);
        ProjectGraph::assemble(project, &tempo_map, &mut resolver, &context, &config, window, options)
            .unwrap()
    }

    #[test]
    fn test_metronome_muted_for_render() {
        let (project, source) = one_clip_project();
        let mut graph = assemble(&project, &source, &PassOptions::render(&EngineConfig::default()));
        assert!(graph.has_limiter());

        let mut out = AudioBuffer::new(128, ChannelLayout::Stereo);
        graph.render_block(0.0, &mut out);
        assert!((out.channel(0)[0] - 0.25).abs() < 1e-6);

        let mut graph = assemble(&project, &source, &PassOptions::playback(HashMap::new()));
        assert!(!graph.has_limiter());
        graph.render_block(0.0, &mut out);
        assert!((out.channel(0)[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_mix_track_effects_process_the_mix() {
        let (mut project, source) = one_clip_project();
        project.tracks[0].push_breakpoint("VOLUME", "GAIN", Breakpoint::square(1.0, -6.0));
        let mut graph = assemble(&project, &source, &PassOptions::playback(HashMap::new()));

        let mut out = AudioBuffer::new(128, ChannelLayout::Stereo);
        graph.render_block(0.0, &mut out);
        // tone through -6 dB plus the untouched metronome
        let expected = 0.25 * 0.501_187_2 + 0.5;
        assert!((out.channel(0)[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_limiter_holds_loud_mix_down() {
        let mut project = Project::new(1.0, 120.0);
        project.add_clip(Clip::new("LOUD", 1, 1.0));
        project.add_clip(Clip::new("LOUD", 2, 1.0));
        let source = MemoryClipSource::new().with_clip("LOUD", constant(44100, 0.9), None);
        let mut graph = assemble(&project, &source, &PassOptions::render(&EngineConfig::default()));

        let mut out = AudioBuffer::new(4096, ChannelLayout::Stereo);
        graph.render_block(0.0, &mut out);
        assert!(out.channel(0)[4095] < 1.0);
    }
}
