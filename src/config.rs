//! Engine configuration
//!
//! Every field has a default, so a partial JSON file (or none) is enough.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{RENDER_CHANNELS, RENDER_SAMPLE_RATE};
use crate::error::{EngineError, Result};

/// Rendering and export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Context sample rate in Hz
    pub sample_rate: u32,
    /// Output channel count
    pub channels: usize,
    /// Frames processed per render quantum
    pub block_size: usize,
    /// MP3 bitrate in kbps
    pub mp3_bitrate_kbps: u32,
    /// FLAC block size in frames
    pub flac_compression_block_size: usize,
    /// Fade applied to the master gain when playback stops
    pub stop_fade_secs: f64,
    /// Fade used when an effect is routed around or back in
    pub bypass_fade_secs: f64,
    /// Put a peak limiter on the master bus when rendering for export
    pub use_limiter_on_export: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: RENDER_SAMPLE_RATE,
            channels: RENDER_CHANNELS,
            block_size: 128,
            mp3_bitrate_kbps: 160,
            flac_compression_block_size: 4096,
            stop_fade_secs: 0.05,
            bypass_fade_secs: 0.005,
            use_limiter_on_export: true,
        }
    }
}

impl EngineConfig {
    /// Load a configuration file, filling missing fields with defaults
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        // every output format is written at the fixed render rate
        if self.sample_rate != RENDER_SAMPLE_RATE {
            return Err(EngineError::ContextAllocation {
                reason: format!(
                    "only {} Hz rendering is supported, got {} Hz",
                    RENDER_SAMPLE_RATE, self.sample_rate
                ),
            });
        }
        if self.channels != RENDER_CHANNELS {
            return Err(EngineError::ContextAllocation {
                reason: format!(
                    "only {} output channels are supported, got {}",
                    RENDER_CHANNELS, self.channels
                ),
            });
        }
        if self.block_size == 0 {
            return Err(EngineError::ContextAllocation {
                reason: "block size must be positive".to_string(),
            });
        }
        if !(self.stop_fade_secs >= 0.0 && self.bypass_fade_secs >= 0.0) {
            return Err(EngineError::ContextAllocation {
                reason: "fade times must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 2);
        assert_eq!(config.mp3_bitrate_kbps, 160);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"block_size": 256, "use_limiter_on_export": false}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.block_size, 256);
        assert!(!config.use_limiter_on_export);
        assert_eq!(config.sample_rate, 44100);
    }

    #[test]
    fn test_rejects_other_sample_rates() {
        for sample_rate in [0, 22050, 48000] {
            let config = EngineConfig {
                sample_rate,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.error_code(), "CONTEXT_ALLOCATION");
        }
    }

    #[test]
    fn test_rejects_mono() {
        let config = EngineConfig {
            channels: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
