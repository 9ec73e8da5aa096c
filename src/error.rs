//! Error types for the radio playback core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playback engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The stream URI could not be parsed or uses an unsupported scheme
    #[error("Invalid stream source: {0}")]
    InvalidSource(String),

    /// The engine was used after `release()`. This is a programming error.
    #[error("Engine used after release")]
    EngineReleased,

    /// Decode or network failure while a session was live
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors reported to callers of the command inlet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// Audio focus was refused by the host; playback state is unchanged
    #[error("Audio focus denied")]
    FocusDenied,

    #[error("Invalid stream source: {0}")]
    InvalidSource(String),

    /// The engine could not open the stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// The player task has shut down
    #[error("Player is closed")]
    Closed,
}

/// Persisted playback flag storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file: {0}")]
    Read(std::io::Error),

    #[error("Failed to write state file: {0}")]
    Write(std::io::Error),

    #[error("Corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<EngineError> for PlayerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidSource(msg) => PlayerError::InvalidSource(msg),
            EngineError::Transport(reason) => PlayerError::Transport(reason),
            EngineError::EngineReleased => PlayerError::Closed,
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
