//! Error types for the cry classification system

use thiserror::Error;

/// Error type for extraction, inference, loading and training
#[derive(Debug, Clone, Error)]
pub enum CryError {
    /// E001: Invalid audio format (e.g., unsupported container or bit depth)
    #[error("E001: Invalid audio format - {0}")]
    InvalidAudioFormat(String),
    /// E002: Unsupported sample rate
    #[error("E002: Unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    /// E003: Configuration validation failed
    #[error("E003: Configuration validation failed - {0}")]
    ConfigValidationFailed(String),
    /// E004: Audio file I/O error
    #[error("E004: Audio file I/O error - {0}")]
    AudioFileError(String),
    /// E005: Resampling error
    #[error("E005: Resampling error - {0}")]
    ResampleError(String),
    /// E006: Feature extraction failed (empty signal or transform error)
    #[error("E006: Feature extraction failed - {0}")]
    ExtractionFailed(String),
    /// E007: Essential model component missing or unusable
    #[error("E007: Model not loaded - {0}")]
    ModelNotLoaded(String),
    /// E008: Stage inference error
    #[error("E008: Inference failed - {0}")]
    InferenceFailed(String),
    /// E009: Unknown sensitivity mode
    #[error("E009: Invalid sensitivity '{0}' (expected high, balanced or precise)")]
    InvalidSensitivity(String),
    /// E010: Threshold bundle violates its invariants
    #[error("E010: Invalid thresholds - {0}")]
    InvalidThresholds(String),
    /// E011: Model artifact read/write error
    #[error("E011: Model artifact error - {0}")]
    ArtifactError(String),
    /// E012: Dataset discovery or layout error
    #[error("E012: Dataset error - {0}")]
    DatasetError(String),
    /// E013: Stage training error
    #[error("E013: Training error - {0}")]
    TrainingError(String),
}

impl From<std::io::Error> for CryError {
    fn from(err: std::io::Error) -> Self {
        CryError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for CryError {
    fn from(err: hound::Error) -> Self {
        CryError::AudioFileError(format!("WAV decode error: {}", err))
    }
}

impl From<serde_json::Error> for CryError {
    fn from(err: serde_json::Error) -> Self {
        CryError::ArtifactError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for CryError {
    fn from(err: anyhow::Error) -> Self {
        CryError::ConfigValidationFailed(format!("{:#}", err))
    }
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, CryError>;
