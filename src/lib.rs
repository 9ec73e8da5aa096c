//! # Radio Core
//!
//! Playback state machine and audio-focus arbitration for an internet-radio
//! player.
//!
//! ## Architecture Overview
//!
//! ```text
//!   UI shell            host audio system          HTTP/Icecast stream
//!  (commands)          (focus notifications)        (engine events)
//!      │                       │                           │
//!      │ PlayerHandle          │ FocusCallback             │ EngineEventSink
//!      ▼                       ▼                           ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │             single serialized input queue (tokio mpsc)           │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     StreamStateMachine task                      │
//! │  ┌──────────────┐  ┌───────────────────┐  ┌───────────────────┐  │
//! │  │PlaybackEngine│  │ AudioFocusArbiter │  │  ProgressTicker   │──┼─► ticks
//! │  └──────────────┘  └───────────────────┘  └───────────────────┘  │
//! │          clean-shutdown flag ──► PlaybackStore                   │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//!                 StatePublisher (one bounded queue per observer)
//!                   │              │                │
//!                   ▼              ▼                ▼
//!                Web UI      notification      lock screen
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod focus;
pub mod player;
pub mod source;
pub mod store;
pub mod ui;

pub use engine::{EngineEvent, HttpStreamEngine, PlaybackEngine, Position, SessionId};
pub use error::{EngineError, Error, PlayerError, Result, StoreError};
pub use focus::{AudioFocusArbiter, FocusCallback, FocusChange, FocusHost, FocusState};
pub use player::{
    ObserverId, PlaybackState, Player, PlayerBuilder, PlayerEvent, PlayerHandle, StatePublisher,
    Subscription,
};
pub use source::StreamSource;
pub use store::{FileStore, MemoryStore, PlaybackStore};

/// Application-wide constants
pub mod constants {
    /// Stream played when no URI is configured
    pub const DEFAULT_STREAM_URI: &str = "http://media-ice.musicradio.com/CapitalGlasgowMP3";

    /// Default maximum listening session in hours
    pub const DEFAULT_SESSION_LIMIT_HOURS: u32 = 3;

    /// Progress report interval
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

    /// Events buffered per subscriber before new ones are dropped
    pub const DEFAULT_PUBLISHER_BUFFER: usize = 64;

    /// Output gain while ducked
    pub const DEFAULT_DUCK_VOLUME: f32 = 0.2;

    /// Default HTTP port for the control surface
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Chunks queued towards the decoder
    pub const SINK_CHANNEL_CAPACITY: usize = 256;

    pub const STATE_FILE_NAME: &str = "playback_state.json";

    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
