//! Automix - Effect Automation and Rendering Engine
//!
//! Automix turns a multi-track arrangement (clips placed on a measure
//! grid, plus per-track effect automation) into audio, either pulled live
//! by a host audio callback or rendered offline to WAV, MP3 or FLAC.
//!
//! # Architecture
//!
//! Every playback or render pass builds its own graph:
//! - [`project`]: the arrangement data and its tempo map
//! - [`effects`]: parameter tables and processing stages for each effect
//! - [`graph`]: effect chains with scheduled automation, and the project graph
//! - [`engine`]: context clock, clip loading, renderer, encoders, player
//!
//! Nothing is shared between passes except the read-only project.

pub mod cli;
pub mod config;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod error;
pub mod graph;
pub mod project;

pub use config::EngineConfig;
pub use engine::{
    merge_clips, render_buffer, render_flac, render_wav, AudioBuffer, AudioContext, ClipSource,
    DirectoryClipSource, MemoryClipSource, PlayRequest, Player,
};
#[cfg(feature = "mp3")]
pub use engine::render_mp3;
pub use error::{EngineError, ErrorCategory, Result};
pub use project::{Breakpoint, Clip, ClipTransform, Project, Shape, TempoMap, Track};
