//! Playback engine contract
//!
//! The engine owns the transport session for one stream. Its side effects are
//! reported only through [`EngineEventSink`]; the state machine is the sole
//! caller of every method here.

pub mod http;
pub mod sink;

pub use http::HttpStreamEngine;
pub use sink::{AudioSink, ChannelSink, NullSink};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::source::StreamSource;

/// Identifies one `start()` of the engine.
///
/// Every event carries the id of the session that produced it so that events
/// from a superseded session can be told apart from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Point-in-time measurement from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Known(Duration),
    Unknown,
}

impl Position {
    pub fn known(self) -> Option<Duration> {
        match self {
            Position::Known(d) => Some(d),
            Position::Unknown => None,
        }
    }
}

/// Station information advertised by the stream server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Advertised bitrate in kbit/s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}

impl StreamMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.genre.is_none()
            && self.description.is_none()
            && self.bitrate_kbps.is_none()
    }
}

/// Low-level transport events
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Buffering,
    Started,
    /// The remote end closed the stream without being asked to
    Stopped,
    TransportError(String),
    Metadata(StreamMetadata),
}

/// An engine event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub session: SessionId,
    pub event: EngineEvent,
}

/// Where an engine delivers its events.
///
/// Cloned into every transport task; emitting never blocks.
#[derive(Clone)]
pub struct EngineEventSink {
    emit: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EngineEventSink {
    pub fn new(emit: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// A sink that discards everything
    pub fn detached() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, session: SessionId, event: EngineEvent) {
        (self.emit)(TransportEvent { session, event });
    }
}

impl fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSink").finish_non_exhaustive()
    }
}

/// Contract of the decode/transport session owner.
///
/// `stop()` and `release()` never fault when repeated. After `release()` every
/// method other than `release()` itself fails with
/// [`EngineError::EngineReleased`].
pub trait PlaybackEngine: Send + 'static {
    /// Wire up event delivery. Called once by the player before any other method.
    fn bind_events(&mut self, events: EngineEventSink);

    /// Bind the engine to a stream. Idempotent if the source is unchanged.
    fn configure(&mut self, source: StreamSource) -> Result<(), EngineError>;

    /// Begin connecting. Completes asynchronously with `Buffering`, `Started`
    /// or `TransportError` on the returned session.
    fn start(&mut self) -> Result<SessionId, EngineError>;

    /// Suspend output. No-op unless playing.
    fn pause(&mut self) -> Result<(), EngineError>;

    /// Tear down the transport session, including a partially started one
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Free all resources permanently
    fn release(&mut self);

    /// Output gain in `0.0..=1.0`, used for ducking
    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError>;

    fn position(&self) -> Result<Position, EngineError>;

    fn duration(&self) -> Result<Position, EngineError>;
}
