//! Error types for the voxloop turn controller.

use thiserror::Error;

/// Result type alias for turn-loop operations
pub type LoopResult<T> = Result<T, LoopError>;

/// Errors that can occur in the conversational turn loop
#[derive(Error, Debug)]
pub enum LoopError {
    /// Permission denied or no input device. Terminal for the session;
    /// nothing retries this automatically.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A fragment-producing capture session already exists.
    #[error("A capture session is already running")]
    AlreadyCapturing,

    /// Zero fragments were appended before finalize.
    #[error("No audio recorded")]
    EmptyRecording,

    /// Payload below the viability threshold; treated as silence/noise.
    #[error("Recording too short: {size} bytes (threshold {threshold})")]
    TooShort { size: usize, threshold: usize },

    /// Network error or non-parsable response from the agent endpoint.
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Playback error: {0}")]
    Playback(String),

    /// Endpoint responded with an `error` field in an otherwise valid payload.
    #[error("Remote endpoint reported: {0}")]
    RemoteReported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for LoopError {
    fn from(err: cpal::DevicesError) -> Self {
        LoopError::DeviceUnavailable(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for LoopError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        LoopError::DeviceUnavailable(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for LoopError {
    fn from(err: cpal::BuildStreamError) -> Self {
        LoopError::DeviceUnavailable(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for LoopError {
    fn from(err: cpal::PlayStreamError) -> Self {
        LoopError::DeviceUnavailable(err.to_string())
    }
}
