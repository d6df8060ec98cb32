//! Audio Engine Module
//!
//! Core runtime of the engine:
//! - Audio buffers and the per-pass context clock
//! - Sample-accurate parameter automation
//! - Clip loading and transform resolution
//! - Offline rendering, output encoders and interactive playback

pub mod buffer;
pub mod clips;
pub mod context;
pub mod encode;
pub mod param;
pub mod player;
pub mod renderer;

pub use buffer::{AudioBuffer, ChannelLayout, RENDER_CHANNELS, RENDER_SAMPLE_RATE};
pub use clips::{ClipBuffer, ClipResolver, ClipSource, DirectoryClipSource, MemoryClipSource};
pub use context::{AudioContext, ContextKind, RenderSource};
#[cfg(feature = "mp3")]
pub use encode::encode_mp3;
pub use encode::{encode_flac, encode_wav, float_to_i16, PcmInput};
pub use param::AudioParam;
pub use player::{PlayRequest, Player, TransportState};
#[cfg(feature = "async")]
pub use renderer::render_buffer_async;
#[cfg(feature = "mp3")]
pub use renderer::render_mp3;
pub use renderer::{
    merge_clips, pcm_checksum, render_buffer, render_flac, render_to_file, render_wav,
    OutputFormat,
};
