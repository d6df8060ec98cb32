//! Effect catalog
//!
//! Parameter descriptions, the node control surface, and one processing
//! stage per registered effect.

mod basic;
pub mod catalog;
mod character;
mod filters;
mod modulation;
pub mod node;
pub mod spec;
mod time;

pub use catalog::{lookup, EffectDefinition, EFFECTS, TEMPO};
pub use node::{EffectNode, Parameter};
pub use spec::{ParamSpec, Scale};
