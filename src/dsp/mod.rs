//! DSP Primitives
//!
//! Sample-level building blocks used by the effect catalog. Each primitive
//! takes its time-varying settings per call so automation can drive it at
//! audio rate.

pub mod biquad;
pub mod crossfade;
pub mod delay_line;
pub mod dynamics;
pub mod freeverb;
pub mod oscillator;
pub mod pitch;
pub mod shaper;

pub use biquad::{Biquad, FilterKind, FilterParams};
pub use crossfade::Crossfade;
pub use delay_line::DelayLine;
pub use dynamics::{Compressor, DynamicsSettings};
pub use freeverb::Freeverb;
pub use oscillator::Lfo;
pub use pitch::PitchShifter;
pub use shaper::WaveShaper;
