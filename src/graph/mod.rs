//! Graph construction
//!
//! [`builder`] turns one track's automation into a scheduled effect chain;
//! [`assembler`] places clips and chains every track into a renderable
//! project graph.

pub mod assembler;
pub mod builder;

pub use assembler::{
    schedule_clip, ClipLayer, PassOptions, PlayWindow, ProjectGraph, ScheduledClip, TrackGraph,
};
pub use builder::{
    value_at_measure, value_at_time, BypassSet, EffectChain, GraphBuilder, PassTiming,
};
