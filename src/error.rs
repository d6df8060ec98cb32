//! Error handling for Automix
//!
//! Errors fall into three categories. Data errors describe malformed
//! automation or project data and always name the track, effect and
//! parameter involved. Resource errors cover rendering-context allocation
//! and encoder failures. I/O errors wrap the filesystem and serde layers.

use thiserror::Error;

/// Result type alias for Automix operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Broad classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed project or automation data
    Data,
    /// Rendering context or encoder failure
    Resource,
    /// Filesystem or serialization failure
    Io,
}

/// Main error type for Automix operations
#[derive(Error, Debug)]
pub enum EngineError {
    // Data Errors
    #[error("Track {track}: unknown effect '{effect}'")]
    UnknownEffect { track: usize, effect: String },

    #[error("Track {track}: effect '{effect}' has no parameter '{parameter}'")]
    UnknownParameter {
        track: usize,
        effect: String,
        parameter: String,
    },

    #[error(
        "Track {track}: {effect}-{parameter} value {value} at measure {measure} is outside {min}..={max}"
    )]
    ValueOutOfRange {
        track: usize,
        effect: String,
        parameter: String,
        measure: f64,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("Track {track}: invalid automation for {effect}-{parameter}: {reason}")]
    InvalidAutomation {
        track: usize,
        effect: String,
        parameter: String,
        reason: String,
    },

    #[error("Invalid project: {reason}")]
    InvalidProject { reason: String },

    #[error("Clip source not found: {key}")]
    ClipNotFound { key: String },

    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Resource Errors
    #[error("Cannot allocate rendering context: {reason}")]
    ContextAllocation { reason: String },

    #[error("{format} encoder failed: {reason}")]
    Encoder { format: &'static str, reason: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::UnknownEffect { .. } => "UNKNOWN_EFFECT",
            EngineError::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            EngineError::ValueOutOfRange { .. } => "VALUE_OUT_OF_RANGE",
            EngineError::InvalidAutomation { .. } => "INVALID_AUTOMATION",
            EngineError::InvalidProject { .. } => "INVALID_PROJECT",
            EngineError::ClipNotFound { .. } => "CLIP_NOT_FOUND",
            EngineError::InvalidAudio { .. } => "INVALID_AUDIO",
            EngineError::ContextAllocation { .. } => "CONTEXT_ALLOCATION",
            EngineError::Encoder { .. } => "ENCODER_FAILED",
            EngineError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Classify the error as a data, resource or I/O failure
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::UnknownEffect { .. }
            | EngineError::UnknownParameter { .. }
            | EngineError::ValueOutOfRange { .. }
            | EngineError::InvalidAutomation { .. }
            | EngineError::InvalidProject { .. }
            | EngineError::ClipNotFound { .. }
            | EngineError::InvalidAudio { .. } => ErrorCategory::Data,
            EngineError::ContextAllocation { .. }
            | EngineError::Encoder { .. }
            | EngineError::UnsupportedFormat { .. } => ErrorCategory::Resource,
            EngineError::Io(_) | EngineError::Serialization(_) => ErrorCategory::Io,
        }
    }

    /// Check if this error was caused by the project data rather than the host
    pub fn is_data_error(&self) -> bool {
        self.category() == ErrorCategory::Data
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            EngineError::UnknownEffect { .. } | EngineError::UnknownParameter { .. } => vec![
                "Check the effect and parameter constants used by the script",
                "Effect names are upper case, e.g. VOLUME, DELAY, REVERB",
            ],
            EngineError::ValueOutOfRange { .. } => vec![
                "Keep automation values inside the parameter's documented range",
                "Values are never clamped; fix the value in the script",
            ],
            EngineError::InvalidAutomation { .. } => vec![
                "Breakpoints must be sorted by measure",
                "Only one breakpoint may sit on a given measure",
            ],
            EngineError::ClipNotFound { .. } => vec![
                "Verify the sound was fetched before rendering",
                "Check the clip directory passed to the renderer",
            ],
            EngineError::ContextAllocation { .. } => vec![
                "Shorten the project or lower the sample rate",
                "Close other applications to free memory",
            ],
            EngineError::Encoder { .. } => vec![
                "Try exporting as WAV instead",
                "Check that the encoder feature is enabled in this build",
            ],
            _ => vec![],
        }
    }
}
