//! Effect registration table
//!
//! Every effect a script can name is listed here with its parameter table
//! and the function that builds its processing stage. `TEMPO` is only read
//! by the tempo map and has no processing stage.

use super::basic::{build_compressor, build_pan, build_volume};
use super::character::{build_distortion, build_pitchshift};
use super::filters::{build_bandpass, build_eq3band, build_filter, build_wah};
use super::modulation::{build_chorus, build_flanger, build_phaser, build_ringmod, build_tremolo};
use super::node::BuildFn;
use super::spec::{ParamSpec, Scale, BYPASS, MIX};
use super::time::{build_delay, build_reverb};

/// Name of the tempo placeholder effect and of its single parameter
pub const TEMPO: &str = "TEMPO";

const MS: Scale = Scale::Divide(1000.0);
const DB: Scale = Scale::DbToLinear;

const fn range(to_min: f32, to_max: f32) -> Scale {
    Scale::Range { to_min, to_max }
}

/// Static description of one effect type
#[derive(Clone, Copy)]
pub struct EffectDefinition {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    /// Whether the effect has a wet/dry `MIX` stage
    pub mixable: bool,
    /// `None` for placeholders that are never instantiated
    pub build: Option<BuildFn>,
}

impl std::fmt::Debug for EffectDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectDefinition")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("mixable", &self.mixable)
            .finish()
    }
}

impl EffectDefinition {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|spec| spec.name == name)
    }

    /// True for effects that exist only as data (TEMPO)
    pub fn is_placeholder(&self) -> bool {
        self.build.is_none()
    }
}

// ============================================================================
// Definitions
// ============================================================================

const fn mixable(
    name: &'static str,
    params: &'static [ParamSpec],
    build: BuildFn,
) -> EffectDefinition {
    EffectDefinition {
        name,
        params,
        mixable: true,
        build: Some(build),
    }
}

const fn unmixed(
    name: &'static str,
    params: &'static [ParamSpec],
    build: BuildFn,
) -> EffectDefinition {
    EffectDefinition {
        name,
        params,
        mixable: false,
        build: Some(build),
    }
}

const VOLUME_PARAMS: &[ParamSpec] = &[
    BYPASS,
    ParamSpec::new("GAIN", 0.0, -60.0, 12.0).scaled(DB),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX.with_default(0.5),
    ParamSpec::new("DELAY_TIME", 300.0, 0.0, 4000.0).scaled(MS),
    ParamSpec::new("DELAY_FEEDBACK", -5.0, -120.0, -1.0).scaled(DB),
];

const FILTER_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("FILTER_FREQ", 1000.0, 20.0, 20000.0),
    ParamSpec::new("FILTER_RESONANCE", 0.8, 0.0, 1.0).scaled(range(1.0, 5.0)),
];

const COMPRESSOR_PARAMS: &[ParamSpec] = &[
    BYPASS,
    ParamSpec::new("COMPRESSOR_THRESHOLD", -18.0, -30.0, 0.0),
    ParamSpec::new("COMPRESSOR_RATIO", 10.0, 1.0, 100.0),
];

const PAN_PARAMS: &[ParamSpec] = &[
    BYPASS,
    ParamSpec::new("LEFT_RIGHT", 0.0, -100.0, 100.0).scaled(range(-1.0, 1.0)),
];

const BANDPASS_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("BANDPASS_FREQ", 800.0, 20.0, 20000.0),
    ParamSpec::new("BANDPASS_WIDTH", 0.5, 0.0, 1.0).scaled(range(1.0, 5.0)),
];

const EQ3BAND_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("EQ3BAND_LOWGAIN", 0.0, -24.0, 18.0),
    ParamSpec::new("EQ3BAND_LOWFREQ", 200.0, 20.0, 20000.0),
    ParamSpec::new("EQ3BAND_MIDGAIN", 0.0, -24.0, 18.0),
    ParamSpec::new("EQ3BAND_MIDFREQ", 200.0, 20.0, 20000.0),
    ParamSpec::new("EQ3BAND_HIGHGAIN", 0.0, -24.0, 18.0),
    ParamSpec::new("EQ3BAND_HIGHFREQ", 200.0, 20.0, 20000.0),
];

const CHORUS_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("CHORUS_LENGTH", 15.0, 1.0, 250.0).scaled(MS),
    ParamSpec::new("CHORUS_NUMVOICES", 1.0, 1.0, 8.0),
    ParamSpec::new("CHORUS_RATE", 0.5, 0.1, 16.0),
    ParamSpec::new("CHORUS_MOD", 0.7, 0.0, 1.0).scaled(MS),
];

const FLANGER_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("FLANGER_LENGTH", 6.0, 0.0, 200.0).scaled(MS),
    ParamSpec::new("FLANGER_FEEDBACK", -50.0, -80.0, -1.0).scaled(DB),
    ParamSpec::new("FLANGER_RATE", 0.6, 0.001, 100.0),
];

const PHASER_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("PHASER_RATE", 0.5, 0.0, 10.0),
    ParamSpec::new("PHASER_FEEDBACK", -3.0, -120.0, -1.0).scaled(DB),
    ParamSpec::new("PHASER_RANGEMIN", 440.0, 40.0, 20000.0),
    ParamSpec::new("PHASER_RANGEMAX", 1600.0, 40.0, 20000.0),
];

const TREMOLO_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("TREMOLO_FREQ", 4.0, 0.0, 100.0),
    ParamSpec::new("TREMOLO_AMOUNT", -6.0, -60.0, 0.0).scaled(DB),
];

const DISTORTION_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX.with_default(0.5),
    ParamSpec::new("DISTO_GAIN", 20.0, 0.0, 50.0).scaled(range(0.0, 1.0)),
];

const PITCHSHIFT_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("PITCHSHIFT_SHIFT", 0.0, -12.0, 12.0),
];

const RINGMOD_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("RINGMOD_MODFREQ", 40.0, 0.0, 100.0),
    ParamSpec::new("RINGMOD_FEEDBACK", 0.0, 0.0, 100.0).scaled(Scale::Divide(100.0)),
];

const WAH_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("WAH_POSITION", 0.0, 0.0, 1.0).scaled(range(350.0, 10000.0)),
];

const REVERB_PARAMS: &[ParamSpec] = &[
    BYPASS,
    MIX,
    ParamSpec::new("REVERB_TIME", 3500.0, 0.0, 4000.0).scaled(range(0.0, 0.8)),
    ParamSpec::new("REVERB_DAMPFREQ", 8000.0, 200.0, 18000.0),
];

const TEMPO_PARAMS: &[ParamSpec] = &[ParamSpec::new(TEMPO, 120.0, 45.0, 220.0)];

/// All registered effects
pub static EFFECTS: &[EffectDefinition] = &[
    unmixed("VOLUME", VOLUME_PARAMS, build_volume),
    mixable("DELAY", DELAY_PARAMS, build_delay),
    mixable("FILTER", FILTER_PARAMS, build_filter),
    unmixed("COMPRESSOR", COMPRESSOR_PARAMS, build_compressor),
    unmixed("PAN", PAN_PARAMS, build_pan),
    mixable("BANDPASS", BANDPASS_PARAMS, build_bandpass),
    mixable("EQ3BAND", EQ3BAND_PARAMS, build_eq3band),
    mixable("CHORUS", CHORUS_PARAMS, build_chorus),
    mixable("FLANGER", FLANGER_PARAMS, build_flanger),
    mixable("PHASER", PHASER_PARAMS, build_phaser),
    mixable("TREMOLO", TREMOLO_PARAMS, build_tremolo),
    mixable("DISTORTION", DISTORTION_PARAMS, build_distortion),
    mixable("PITCHSHIFT", PITCHSHIFT_PARAMS, build_pitchshift),
    mixable("RINGMOD", RINGMOD_PARAMS, build_ringmod),
    mixable("WAH", WAH_PARAMS, build_wah),
    mixable("REVERB", REVERB_PARAMS, build_reverb),
    EffectDefinition {
        name: TEMPO,
        params: TEMPO_PARAMS,
        mixable: false,
        build: None,
    },
];

/// Find an effect by name
pub fn lookup(name: &str) -> Option<&'static EffectDefinition> {
    EFFECTS.iter().find(|definition| definition.name == name)
}

/// Names of every registered effect
pub fn effect_names() -> impl Iterator<Item = &'static str> {
    EFFECTS.iter().map(|definition| definition.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::node::EffectNode;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("DELAY").map(|d| d.name), Some("DELAY"));
        assert!(lookup("delay").is_none());
        assert!(lookup(TEMPO).unwrap().is_placeholder());
        assert_eq!(effect_names().count(), 17);
    }

    #[test]
    fn test_defaults_within_range() {
        for definition in EFFECTS {
            for spec in definition.params {
                assert!(
                    spec.contains(spec.default),
                    "{}.{} default out of range",
                    definition.name,
                    spec.name
                );
            }
        }
    }

    #[test]
    fn test_every_parameter_has_a_control() {
        for definition in EFFECTS.iter().filter(|d| !d.is_placeholder()) {
            let node = EffectNode::new(definition, 44100, 0.005).unwrap();
            let names: Vec<_> = node.parameter_names().collect();
            for spec in definition.params {
                assert!(
                    names.contains(&spec.name),
                    "{} has no control for {}",
                    definition.name,
                    spec.name
                );
            }
            assert_eq!(names.len(), definition.params.len());
        }
    }

    #[test]
    fn test_tempo_is_never_instantiated() {
        assert!(EffectNode::new(lookup(TEMPO).unwrap(), 44100, 0.005).is_none());
    }

    #[test]
    fn test_mixable_effects_declare_mix() {
        for definition in EFFECTS {
            assert_eq!(definition.param("MIX").is_some(), definition.mixable);
            assert!(definition.is_placeholder() || definition.param("BYPASS").is_some());
        }
    }
}
