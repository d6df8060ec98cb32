//! Interactive playback
//!
//! A [`Player`] owns one realtime [`AudioContext`] and at most one live
//! pass. `play` schedules everything up front for a single future output
//! time; the host then pulls audio through [`Player::fill_interleaved`]
//! with no further scheduling work until the pass loops, ends or is
//! stopped.
//!
//! Stopping fades the master gain out over `stop_fade_secs`. The pass and
//! all of its nodes are dropped only once the fade has been rendered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::buffer::{AudioBuffer, ChannelLayout, RENDER_CHANNELS};
use super::clips::{ClipResolver, ClipSource};
use super::context::AudioContext;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{BypassSet, PassOptions, PlayWindow, ProjectGraph};
use crate::project::{Project, TempoMap};

/// Transport states of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No pass is live (default state)
    #[default]
    Stopped,
    /// A pass is producing audio
    Playing,
    /// The master gain is fading out before the pass is dropped
    Stopping,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// What to play
#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// First measure heard
    pub start_measure: f64,
    /// Measure the pass stops at; defaults to one past the project end
    pub end_measure: Option<f64>,
    /// Jump back to `start_measure` when `end_measure` is reached
    pub looped: bool,
    /// Parameters to force-bypass, per track index
    pub bypass: HashMap<usize, BypassSet>,
}

impl PlayRequest {
    /// Play from `start_measure` to the end of the project
    pub fn from_measure(start_measure: f64) -> Self {
        Self {
            start_measure,
            end_measure: None,
            looped: false,
            bypass: HashMap::new(),
        }
    }

    /// Loop the region `[start_measure, end_measure)`
    pub fn looped(start_measure: f64, end_measure: f64) -> Self {
        Self {
            start_measure,
            end_measure: Some(end_measure),
            looped: true,
            bypass: HashMap::new(),
        }
    }

    /// Bypass `"EFFECT-PARAMETER"` entries on one track
    pub fn with_bypass<I, S>(mut self, track: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.bypass.insert(track, BypassSet::parse(entries));
        self
    }
}

/// One live pass and the region it covers
struct Pass {
    graph: ProjectGraph,
    window: PlayWindow,
    /// Engine time at which the window ends
    end_time: f64,
    /// Engine time at which a stop fade finishes
    stop_at: Option<f64>,
}

/// Interactive playback session for one project snapshot
pub struct Player {
    context: AudioContext,
    config: EngineConfig,
    source: Arc<dyn ClipSource>,
    project: Option<Arc<Project>>,
    request: Option<PlayRequest>,
    pass: Option<Pass>,
    state: TransportState,
    block: AudioBuffer,
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("current_time", &self.context.current_time())
            .finish()
    }
}

impl Player {
    /// Create a stopped player with its own realtime context
    pub fn new(config: EngineConfig, source: Arc<dyn ClipSource>) -> Result<Self> {
        let context = AudioContext::realtime(&config)?;
        let block = AudioBuffer::with_sample_rate(
            context.block_size(),
            ChannelLayout::Stereo,
            context.sample_rate(),
        );
        Ok(Self {
            context,
            config,
            source,
            project: None,
            request: None,
            pass: None,
            state: TransportState::Stopped,
            block,
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Engine time of the next frame the host will receive
    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    /// Graph of the live pass
    pub fn graph(&self) -> Option<&ProjectGraph> {
        self.pass.as_ref().map(|pass| &pass.graph)
    }

    /// Start a new pass, tearing down any previous one first
    ///
    /// Audio for `request.start_measure` is heard from the next frame the
    /// host pulls.
    pub fn play(&mut self, project: Arc<Project>, request: PlayRequest) -> Result<()> {
        project.validate()?;
        if self.pass.take().is_some() {
            debug!("Dropped previous pass");
        }
        self.state = TransportState::Stopped;

        let output_time = self.context.current_time();
        let pass = self.build_pass(&project, &request, output_time)?;
        info!(
            start_measure = request.start_measure,
            end_measure = ?request.end_measure,
            looped = request.looped,
            "Playback started"
        );

        self.pass = Some(pass);
        self.project = Some(project);
        self.request = Some(request);
        self.state = TransportState::Playing;
        Ok(())
    }

    fn build_pass(&self, project: &Project, request: &PlayRequest, output_time: f64) -> Result<Pass> {
        let tempo_map = TempoMap::from_project(project);
        let end_measure = request.end_measure.unwrap_or(project.length + 1.0);
        if end_measure <= request.start_measure {
            return Err(EngineError::InvalidProject {
                reason: format!(
                    "play region {}..{} is empty",
                    request.start_measure, end_measure
                ),
            });
        }

        let window =
            PlayWindow::from_measures(&tempo_map, request.start_measure, end_measure, output_time);
        // a region under one frame would hit its boundary without advancing
        if window.duration() * (self.context.sample_rate() as f64) < 1.0 {
            return Err(EngineError::InvalidProject {
                reason: format!(
                    "play region {}..{} is shorter than one frame",
                    request.start_measure, end_measure
                ),
            });
        }
        let mut resolver = ClipResolver::new(
            self.source.as_ref(),
            &project.transformed_clips,
            &tempo_map,
            self.context.sample_rate(),
        );
        let graph = ProjectGraph::assemble(
            project,
            &tempo_map,
            &mut resolver,
            &self.context,
            &self.config,
            window,
            &PassOptions::playback(request.bypass.clone()),
        )?;

        Ok(Pass {
            graph,
            end_time: output_time + window.duration(),
            window,
            stop_at: None,
        })
    }

    /// Fade out and release the live pass
    pub fn stop(&mut self) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        if pass.stop_at.is_some() {
            return;
        }

        let now = self.context.current_time();
        let stop_at = now + self.config.stop_fade_secs;
        let gain = pass.graph.master_gain_mut();
        let current = gain.value_at(now);
        gain.cancel_scheduled_values(now);
        gain.set_value_at_time(current, now);
        gain.linear_ramp_to_value_at_time(0.0, stop_at);

        pass.stop_at = Some(stop_at);
        self.state = TransportState::Stopping;
        debug!(fade_secs = self.config.stop_fade_secs, "Stopping playback");
    }

    /// Host pull callback: fill interleaved stereo frames
    ///
    /// Frames after the pass ends are silent.
    pub fn fill_interleaved(&mut self, out: &mut [f32]) {
        let total = out.len() / RENDER_CHANNELS;
        let mut written = 0;
        let mut last_boundary: Option<f64> = None;

        while written < total {
            let now = self.context.current_time();
            let Some(limit) = self.frames_until_boundary(now) else {
                // nothing live: emit silence and keep the clock running
                out[written * RENDER_CHANNELS..total * RENDER_CHANNELS].fill(0.0);
                self.advance_silent(total - written);
                break;
            };

            if limit == 0 {
                if last_boundary == Some(now) {
                    // the restarted pass ended where it began
                    warn!(time = now, "Pass made no progress; stopping");
                    self.pass = None;
                    self.state = TransportState::Stopped;
                    continue;
                }
                last_boundary = Some(now);
                self.on_boundary(now);
                continue;
            }

            let frames = (total - written)
                .min(self.context.block_size())
                .min(limit);
            self.block.resize(frames, RENDER_CHANNELS);
            if let Some(pass) = self.pass.as_mut() {
                self.context.pull(&mut pass.graph, &mut self.block);
            }
            for frame in 0..frames {
                for channel in 0..RENDER_CHANNELS {
                    out[(written + frame) * RENDER_CHANNELS + channel] =
                        self.block.samples[channel][frame];
                }
            }
            written += frames;
        }

        // any trailing odd sample of a ragged host buffer
        out[total * RENDER_CHANNELS..].fill(0.0);
    }

    /// Frames left before the live pass must loop, end or be dropped
    fn frames_until_boundary(&self, now: f64) -> Option<usize> {
        let pass = self.pass.as_ref()?;
        let boundary = pass.stop_at.unwrap_or(pass.end_time).min(pass.end_time);
        let sample_rate = self.context.sample_rate() as f64;
        let remaining = (boundary * sample_rate).round() - (now * sample_rate).round();
        Some(remaining.max(0.0) as usize)
    }

    fn on_boundary(&mut self, now: f64) {
        let Some(pass) = self.pass.take() else {
            return;
        };

        let looping = pass.stop_at.is_none()
            && self.request.as_ref().map_or(false, |request| request.looped);
        if !looping {
            drop(pass);
            self.state = TransportState::Stopped;
            info!("Playback stopped");
            return;
        }

        debug!(
            window_start = pass.window.start_time,
            output_time = now,
            "Looping playback"
        );
        drop(pass);
        let rebuilt = match (&self.project, &self.request) {
            (Some(project), Some(request)) => self.build_pass(project, request, now),
            _ => return,
        };
        match rebuilt {
            Ok(pass) => self.pass = Some(pass),
            Err(err) => {
                warn!(error = %err, "Cannot restart loop; stopping");
                self.state = TransportState::Stopped;
            }
        }
    }

    fn advance_silent(&mut self, frames: usize) {
        struct Silence;
        impl super::context::RenderSource for Silence {
            fn render_block(&mut self, _start_time: f64, out: &mut AudioBuffer) {
                out.clear();
            }
        }
        self.block.resize(frames, RENDER_CHANNELS);
        self.context.pull(&mut Silence, &mut self.block);
    }
}
