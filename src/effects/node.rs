//! Effect nodes
//!
//! An [`EffectNode`] is one instantiated effect: a processing stage, the
//! internal automatable values that drive it, and the user-facing
//! [`Parameter`] controls that map onto those values. The node output is
//!
//! ```text
//! pre = mixable ? dry·input + wet·processed : processed
//! out = bypass_wet·pre + bypass_dry·input
//! ```
//!
//! followed by a routing crossfade that can take the whole node out of the
//! signal path when all of its automated parameters are bypassed.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use super::catalog::EffectDefinition;
use super::spec::{ParamSpec, BYPASS, MIX};
use crate::dsp::crossfade::{blend, Crossfade};
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::param::AudioParam;

/// Index of an internal value inside one node
pub type ParamId = usize;

/// Gain on the processed path, driven by `BYPASS`
pub const BYPASS_WET: ParamId = 0;
/// Gain on the unprocessed path, driven by `BYPASS`
pub const BYPASS_DRY: ParamId = 1;
/// Wet level of mixable effects
pub const WET: ParamId = 2;
/// Dry level of mixable effects
pub const DRY: ParamId = 3;

/// How a user parameter drives internal values
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// One internal value
    Direct(ParamId),
    /// Several internal values set together
    Multi(Vec<ParamId>),
    /// `wet = v`, `dry = 1 - v`
    Mix { wet: ParamId, dry: ParamId },
    /// Binary switch: any non-zero value bypasses; ramps act as steps
    Bypass { wet: ParamId, dry: ParamId },
    /// `left = 0.5 - 0.5v`, `right = 0.5 + 0.5v`
    Pan { left: ParamId, right: ParamId },
    /// Voice `i` is on when `i < v`
    Voices(Vec<ParamId>),
}

impl Control {
    /// Internal values produced by an engine-unit value
    fn targets(&self, value: f32) -> Vec<(ParamId, f32)> {
        match self {
            Control::Direct(id) => vec![(*id, value)],
            Control::Multi(ids) => ids.iter().map(|&id| (id, value)).collect(),
            Control::Mix { wet, dry } => vec![(*wet, value), (*dry, 1.0 - value)],
            Control::Bypass { wet, dry } => {
                let bypassed = value != 0.0;
                vec![
                    (*wet, if bypassed { 0.0 } else { 1.0 }),
                    (*dry, if bypassed { 1.0 } else { 0.0 }),
                ]
            }
            Control::Pan { left, right } => {
                vec![(*left, value * -0.5 + 0.5), (*right, value * 0.5 + 0.5)]
            }
            Control::Voices(ids) => ids
                .iter()
                .enumerate()
                .map(|(i, &id)| (id, if (i as f32) < value { 1.0 } else { 0.0 }))
                .collect(),
        }
    }

    fn is_stepped(&self) -> bool {
        matches!(self, Control::Bypass { .. })
    }

    fn ids(&self) -> Vec<ParamId> {
        self.targets(0.0).into_iter().map(|(id, _)| id).collect()
    }
}

/// Per-sample internal values for the block being processed
#[derive(Debug, Clone, Default)]
pub struct ParamBlock {
    values: Vec<Vec<f32>>,
}

impl ParamBlock {
    /// Values of one internal parameter for every frame of the block
    #[inline]
    pub fn get(&self, id: ParamId) -> &[f32] {
        &self.values[id]
    }
}

/// Processing stage of an effect
pub trait Processor: Send {
    /// Process one block. `output` has the same shape as `input` and its
    /// previous contents are undefined.
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock);
}

/// Collects internal values and controls while an effect is built
#[derive(Debug, Default)]
pub struct NodeBuilder {
    defaults: Vec<f32>,
    controls: Vec<(&'static str, Control)>,
}

impl NodeBuilder {
    fn new(mixable: bool) -> Self {
        let mut builder = Self::default();
        let wet = builder.param(1.0);
        let dry = builder.param(0.0);
        builder.control(BYPASS.name, Control::Bypass { wet, dry });
        let wet = builder.param(0.0);
        let dry = builder.param(0.0);
        if mixable {
            builder.control(MIX.name, Control::Mix { wet, dry });
        }
        builder
    }

    /// Allocate an internal value with an initial level
    pub fn param(&mut self, initial: f32) -> ParamId {
        self.defaults.push(initial);
        self.defaults.len() - 1
    }

    /// Allocate `count` internal values
    pub fn params(&mut self, count: usize, initial: f32) -> Vec<ParamId> {
        (0..count).map(|_| self.param(initial)).collect()
    }

    /// Attach a user parameter to internal values
    pub fn control(&mut self, name: &'static str, control: Control) {
        self.controls.push((name, control));
    }
}

/// Build function registered for each effect
pub type BuildFn = fn(&mut NodeBuilder, u32) -> Box<dyn Processor>;

#[derive(Debug, Clone)]
struct ParamControl {
    spec: ParamSpec,
    control: Control,
    bypassed: bool,
}

/// Handle on one user-facing parameter of a node
///
/// Values passed here are already in the engine unit (see
/// [`ParamSpec::scale`]). Callers schedule in non-decreasing time order.
pub struct Parameter<'a> {
    control: &'a mut ParamControl,
    params: &'a mut [AudioParam],
}

impl Parameter<'_> {
    pub fn spec(&self) -> &ParamSpec {
        &self.control.spec
    }

    /// Step to `value` at `time`
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        if self.control.bypassed {
            return;
        }
        for (id, target) in self.control.control.targets(value) {
            self.params[id].set_value_at_time(target, time);
        }
    }

    /// Ramp linearly to `value`, arriving at `time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        if self.control.bypassed {
            return;
        }
        let stepped = self.control.control.is_stepped();
        for (id, target) in self.control.control.targets(value) {
            if stepped {
                self.params[id].set_value_at_time(target, time);
            } else {
                self.params[id].linear_ramp_to_value_at_time(target, time);
            }
        }
    }

    /// Bypass this parameter: drop its automation and hold its default.
    ///
    /// Clearing the flag re-enables scheduling; the default holds until new
    /// values are scheduled.
    pub fn set_bypass(&mut self, bypass: bool) {
        self.control.bypassed = bypass;
        if bypass {
            for id in self.control.control.ids() {
                self.params[id].cancel_scheduled_values(f64::NEG_INFINITY);
            }
        }
    }

    pub fn get_bypass(&self) -> bool {
        self.control.bypassed
    }
}

/// One instantiated effect
pub struct EffectNode {
    name: &'static str,
    mixable: bool,
    sample_rate: u32,
    params: Vec<AudioParam>,
    controls: IndexMap<&'static str, ParamControl>,
    automations: IndexSet<String>,
    processor: Box<dyn Processor>,
    routing: Crossfade,
    started: bool,
    block: ParamBlock,
    scratch: AudioBuffer,
}

impl std::fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectNode")
            .field("name", &self.name)
            .field("automations", &self.automations)
            .field("routed_around", &self.is_routed_around())
            .finish()
    }
}

impl EffectNode {
    /// Instantiate an effect
    ///
    /// Returns `None` for placeholder effects that have no processing stage.
    pub fn new(definition: &EffectDefinition, sample_rate: u32, bypass_fade_secs: f64) -> Option<Self> {
        let build = definition.build?;
        let mut builder = NodeBuilder::new(definition.mixable);
        let processor = build(&mut builder, sample_rate);

        let mut defaults = builder.defaults;
        let mut claimed = vec![false; defaults.len()];
        let mut controls = IndexMap::new();
        for (name, control) in builder.controls {
            let Some(spec) = definition.param(name) else {
                warn!(effect = definition.name, parameter = name, "Control has no parameter spec");
                continue;
            };
            // Controls start at their scaled default. Aliases share internal
            // values, and the first control attached to a value owns it.
            for (id, value) in control.targets(spec.scaled_default()) {
                if !claimed[id] {
                    defaults[id] = value;
                    claimed[id] = true;
                }
            }
            controls.insert(
                spec.name,
                ParamControl {
                    spec: *spec,
                    control,
                    bypassed: false,
                },
            );
        }

        Some(Self {
            name: definition.name,
            mixable: definition.mixable,
            sample_rate,
            params: defaults.into_iter().map(AudioParam::new).collect(),
            controls,
            automations: IndexSet::new(),
            processor,
            routing: Crossfade::new(bypass_fade_secs, sample_rate),
            started: false,
            block: ParamBlock::default(),
            scratch: AudioBuffer::default(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Names of every user parameter, in declaration order
    pub fn parameter_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.controls.keys().copied()
    }

    /// Control surface for one parameter
    pub fn parameter(&mut self, name: &str) -> Option<Parameter<'_>> {
        let control = self.controls.get_mut(name)?;
        Some(Parameter {
            control,
            params: &mut self.params,
        })
    }

    /// Value of a parameter's first internal control at engine time `time`
    pub fn internal_value(&self, name: &str, time: f64) -> Option<f32> {
        let control = self.controls.get(name)?;
        let id = *control.control.ids().first()?;
        Some(self.params[id].value_at(time))
    }

    /// Record that a parameter is under automation in this pass
    pub fn mark_automated(&mut self, parameter: &str) {
        self.automations.insert(parameter.to_string());
    }

    pub fn automations(&self) -> &IndexSet<String> {
        &self.automations
    }

    /// Route the signal around the node when every automated parameter is
    /// bypassed, otherwise through it.
    ///
    /// The switch crossfades once audio has started flowing; before that it
    /// takes effect immediately.
    pub fn update_bypass(&mut self) {
        let route_around = !self.automations.is_empty()
            && self.automations.iter().all(|name| {
                self.controls
                    .get(name.as_str())
                    .map_or(false, |control| control.bypassed)
            });
        let target = if route_around { 1.0 } else { 0.0 };
        if self.started {
            self.routing.set_target(target);
        } else {
            self.routing.jump_to(target);
        }
        debug!(effect = self.name, route_around, "Updated effect routing");
    }

    /// True when the node currently passes its input through untouched
    pub fn is_routed_around(&self) -> bool {
        self.routing.is_dry()
    }

    /// Process one block starting at engine time `start_time`
    pub fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, start_time: f64) {
        self.started = true;
        if self.routing.is_dry() {
            output.copy_from(input);
            return;
        }

        let frames = input.len();
        let channels = input.channels();
        self.prepare_block(frames, channels, start_time);
        self.processor.process(input, &mut self.scratch, &self.block);

        let bypass_wet = &self.block.values[BYPASS_WET];
        let bypass_dry = &self.block.values[BYPASS_DRY];
        let wet = &self.block.values[WET];
        let dry = &self.block.values[DRY];

        for i in 0..frames {
            let weight = self.routing.next_weight();
            for ch in 0..channels {
                let x = input.samples[ch][i];
                let processed = self.scratch.samples[ch][i];
                let pre = if self.mixable {
                    dry[i] * x + wet[i] * processed
                } else {
                    processed
                };
                let y = bypass_wet[i] * pre + bypass_dry[i] * x;
                output.samples[ch][i] = blend(y, x, weight);
            }
        }
    }

    fn prepare_block(&mut self, frames: usize, channels: usize, start_time: f64) {
        if self.block.values.len() != self.params.len() {
            self.block.values = vec![Vec::new(); self.params.len()];
        }
        for (values, param) in self.block.values.iter_mut().zip(&self.params) {
            values.resize(frames, 0.0);
            param.fill(start_time, self.sample_rate, values);
        }
        if self.scratch.len() != frames || self.scratch.channels() != channels {
            let layout = ChannelLayout::from_count(channels).unwrap_or_default();
            self.scratch = AudioBuffer::with_sample_rate(frames, layout, self.sample_rate);
        }
    }
}
