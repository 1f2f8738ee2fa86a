//! Error types and handling
//!
//! Common error types used across the capture/control pipeline.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum VideoError {
    /// The underlying device could not be opened, or the source has
    /// permanently failed. Recoverable through device rediscovery.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A mid-stream frame acquisition failed.
    #[error("capture failure: {0}")]
    CaptureFailure(String),

    /// A command referenced a camera label that is not in the registry.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// The recording sink failed to open, write, or close.
    #[error("writer failure: {0}")]
    WriterFailure(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using VideoError
pub type VideoResult<T> = Result<T, VideoError>;
