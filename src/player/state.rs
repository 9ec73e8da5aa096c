//! Playback state and the events published to observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::StreamMetadata;

/// Canonical playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// One published transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: PlaybackState,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per player; 0 is the initial state before any transition
    pub sequence: u64,
}

impl StateChange {
    pub fn initial() -> Self {
        Self {
            state: PlaybackState::Stopped,
            timestamp: Utc::now(),
            sequence: 0,
        }
    }
}

/// Periodic progress while playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// `HH:MM:SS` since playback (re)started
    pub elapsed: String,
    /// `HH:MM:SS` until the session limit, the stream duration, or `--:--:--`
    pub remaining: String,
    pub elapsed_secs: u64,
}

/// Everything observers can receive
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    StateChanged(StateChange),
    Progress(Progress),
    FocusDenied {
        timestamp: DateTime<Utc>,
    },
    TransportError {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    Metadata(StreamMetadata),
}

impl PlayerEvent {
    /// The new state, if this is a transition
    pub fn state(&self) -> Option<PlaybackState> {
        match self {
            PlayerEvent::StateChanged(change) => Some(change.state),
            _ => None,
        }
    }
}
