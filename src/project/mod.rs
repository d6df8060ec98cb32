//! Project Data Model
//!
//! The arrangement handed to the engine by the script-execution layer:
//! tracks, clips, per-track effect automation and the tempo map derived
//! from the mix track. The engine only ever reads these values.

pub mod model;
pub mod tempo;

pub use model::{
    Breakpoint, Clip, ClipTransform, EffectAutomation, Project, Shape, Track, MIX_TRACK,
    TEMPO_EFFECT, TEMPO_PARAMETER,
};
pub use tempo::TempoMap;
