//! Graph Builder
//!
//! Turns one track's automation into a chain of [`EffectNode`]s with every
//! breakpoint scheduled on the context clock.
//!
//! For a pass that starts at track time `t0` and outputs from engine time
//! `t_out`, each automated parameter gets one step to its value at `t0`
//! followed by every later breakpoint, shifted by `t_out - t0`. A breakpoint
//! exactly at `t0` is the one in effect, never a future one.

use std::collections::HashSet;

use tracing::{debug, debug_span, warn};

use crate::config::EngineConfig;
use crate::effects::catalog;
use crate::effects::node::EffectNode;
use crate::effects::spec::ParamSpec;
use crate::engine::buffer::AudioBuffer;
use crate::engine::context::AudioContext;
use crate::error::{EngineError, Result};
use crate::project::{Breakpoint, Shape, TempoMap, Track};

// ============================================================================
// Pass timing and bypass requests
// ============================================================================

/// Where a pass starts on the track timeline and on the engine clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassTiming {
    /// Track-local start time in seconds (`t0`)
    pub start_time: f64,
    /// Engine time at which audio for `start_time` comes out (`t_out`)
    pub output_time: f64,
}

impl PassTiming {
    pub fn new(start_time: f64, output_time: f64) -> Self {
        Self {
            start_time,
            output_time,
        }
    }

    /// Engine time of a track-local time
    #[inline]
    pub fn to_engine_time(&self, track_time: f64) -> f64 {
        self.output_time + (track_time - self.start_time)
    }
}

impl Default for PassTiming {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Effect parameters to force off for one pass
///
/// Built from `"EFFECT-PARAMETER"` strings, e.g. `"DELAY-DELAY_TIME"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BypassSet {
    entries: HashSet<(String, String)>,
}

impl BypassSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `"EFFECT-PARAMETER"` entries; malformed entries are skipped
    pub fn parse<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('-') {
                Some((effect, parameter)) if !effect.is_empty() && !parameter.is_empty() => {
                    set.insert(effect, parameter);
                }
                _ => warn!(entry, "Ignoring malformed bypass entry"),
            }
        }
        set
    }

    pub fn insert(&mut self, effect: &str, parameter: &str) {
        self.entries
            .insert((effect.to_string(), parameter.to_string()));
    }

    pub fn contains(&self, effect: &str, parameter: &str) -> bool {
        self.entries
            .contains(&(effect.to_string(), parameter.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Envelope evaluation
// ============================================================================

/// Value of an envelope at time `at`, given each breakpoint's time.
///
/// The first breakpoint's value also covers the time before it. `None` only
/// for an empty envelope.
fn interpolate(
    envelope: &[Breakpoint],
    times: &[f64],
    at: f64,
    scale: impl Fn(f32) -> f32,
) -> Option<f32> {
    let next = times.partition_point(|&time| time <= at);
    let Some(current) = next.checked_sub(1) else {
        return envelope.first().map(|point| scale(point.value));
    };
    let point = &envelope[current];
    let value = scale(point.value);

    match (point.shape, envelope.get(next)) {
        (Shape::Linear, Some(following)) => {
            let span = times[next] - times[current];
            if span <= 0.0 {
                return Some(value);
            }
            let fraction = ((at - times[current]) / span) as f32;
            Some(value + (scale(following.value) - value) * fraction)
        }
        _ => Some(value),
    }
}

fn breakpoint_times(envelope: &[Breakpoint], tempo_map: &TempoMap) -> Vec<f64> {
    envelope
        .iter()
        .map(|point| tempo_map.measure_to_time(point.measure))
        .collect()
}

/// Value of an envelope at `seconds`, in the parameter's user-facing unit
pub fn value_at_time(envelope: &[Breakpoint], tempo_map: &TempoMap, seconds: f64) -> Option<f32> {
    let times = breakpoint_times(envelope, tempo_map);
    interpolate(envelope, &times, seconds, |value| value)
}

/// Value of an envelope at a measure position, in the user-facing unit
pub fn value_at_measure(envelope: &[Breakpoint], tempo_map: &TempoMap, measure: f64) -> Option<f32> {
    value_at_time(envelope, tempo_map, tempo_map.measure_to_time(measure))
}

fn check_range(
    track: usize,
    effect: &str,
    spec: &ParamSpec,
    envelope: &[Breakpoint],
) -> Result<()> {
    match envelope.iter().find(|point| !spec.contains(point.value)) {
        Some(point) => Err(EngineError::ValueOutOfRange {
            track,
            effect: effect.to_string(),
            parameter: spec.name.to_string(),
            measure: point.measure,
            value: point.value,
            min: spec.min,
            max: spec.max,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Effect chain
// ============================================================================

/// Effect nodes of one track, processed in series
#[derive(Debug)]
pub struct EffectChain {
    track_index: usize,
    nodes: Vec<EffectNode>,
    front: AudioBuffer,
    back: AudioBuffer,
}

impl EffectChain {
    pub fn new(track_index: usize, nodes: Vec<EffectNode>) -> Self {
        Self {
            track_index,
            nodes,
            front: AudioBuffer::default(),
            back: AudioBuffer::default(),
        }
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn nodes(&self) -> &[EffectNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&EffectNode> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut EffectNode> {
        self.nodes.iter_mut().find(|node| node.name() == name)
    }

    /// Effect names in signal order
    pub fn effect_names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(EffectNode::name).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run `input` through every node; an empty chain copies it
    pub fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, start_time: f64) {
        if self.nodes.is_empty() {
            output.copy_from(input);
            return;
        }

        let (frames, channels) = (input.len(), input.channels());
        self.front.resize(frames, channels);
        self.back.resize(frames, channels);
        self.front.copy_from(input);
        for node in &mut self.nodes {
            node.process(&self.front, &mut self.back, start_time);
            std::mem::swap(&mut self.front, &mut self.back);
        }
        output.copy_from(&self.front);
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds effect chains for one playback or render pass
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'a> {
    sample_rate: u32,
    bypass_fade_secs: f64,
    tempo_map: &'a TempoMap,
    timing: PassTiming,
    bypass: &'a BypassSet,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        context: &AudioContext,
        config: &EngineConfig,
        tempo_map: &'a TempoMap,
        timing: PassTiming,
        bypass: &'a BypassSet,
    ) -> Self {
        Self {
            sample_rate: context.sample_rate(),
            bypass_fade_secs: config.bypass_fade_secs,
            tempo_map,
            timing,
            bypass,
        }
    }

    pub fn timing(&self) -> PassTiming {
        self.timing
    }

    /// Instantiate and schedule every effect of one track
    ///
    /// Effects are chained in the order they first appear in the track.
    /// Unknown names and out-of-range values fail the whole track; nothing
    /// is clamped.
    pub fn build_track(&self, track_index: usize, track: &Track) -> Result<EffectChain> {
        let span = debug_span!("track", index = track_index);
        let _enter = span.enter();

        let mut nodes = Vec::with_capacity(track.effects.len());
        for (effect, params) in &track.effects {
            let definition =
                catalog::lookup(effect).ok_or_else(|| EngineError::UnknownEffect {
                    track: track_index,
                    effect: effect.clone(),
                })?;
            for (parameter, envelope) in params {
                let spec =
                    definition
                        .param(parameter)
                        .ok_or_else(|| EngineError::UnknownParameter {
                            track: track_index,
                            effect: effect.clone(),
                            parameter: parameter.clone(),
                        })?;
                check_range(track_index, effect, spec, envelope)?;
            }

            let Some(mut node) =
                EffectNode::new(definition, self.sample_rate, self.bypass_fade_secs)
            else {
                // tempo lives in the tempo map, not the signal path
                continue;
            };

            for (parameter, envelope) in params {
                self.schedule(&mut node, parameter, envelope);
                node.mark_automated(parameter);
                if self.bypass.contains(effect, parameter) {
                    if let Some(mut control) = node.parameter(parameter) {
                        control.set_bypass(true);
                    }
                    debug!(effect = %effect, parameter = %parameter, "Bypassed parameter");
                }
            }

            node.update_bypass();
            if node.is_routed_around() {
                warn!(effect = %effect, track = track_index, "Every automated parameter is bypassed; routing around effect");
            }
            nodes.push(node);
        }

        debug!(effects = nodes.len(), "Built effect chain");
        Ok(EffectChain::new(track_index, nodes))
    }

    fn schedule(&self, node: &mut EffectNode, parameter: &str, envelope: &[Breakpoint]) {
        let Some(mut control) = node.parameter(parameter) else {
            return;
        };
        let spec = *control.spec();
        let times = breakpoint_times(envelope, self.tempo_map);
        let t0 = self.timing.start_time;

        let Some(start) = interpolate(envelope, &times, t0, |value| spec.scale(value)) else {
            return;
        };
        control.set_value_at_time(start, self.timing.output_time);

        let first_future = times.partition_point(|&time| time <= t0);
        for index in first_future..envelope.len() {
            let time = self.timing.to_engine_time(times[index]);
            let value = spec.scale(envelope[index].value);
            let previous_shape = index.checked_sub(1).map(|previous| envelope[previous].shape);
            if previous_shape == Some(Shape::Linear) {
                control.linear_ramp_to_value_at_time(value, time);
            } else {
                control.set_value_at_time(value, time);
            }
        }

        debug!(
            parameter,
            start,
            scheduled = envelope.len() - first_future,
            "Scheduled automation"
        );
    }
}
