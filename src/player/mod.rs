//! The player: a single serialized state machine and its handles
//!
//! User commands, focus notifications, engine transport events and ticker
//! timeouts are all producers into one unbounded queue. A single task drains
//! it and owns the engine, so no two inputs are ever applied concurrently.

mod machine;
pub mod publisher;
pub mod state;
pub mod ticker;

pub use publisher::{ObserverId, StatePublisher, Subscription};
pub use state::{PlaybackState, PlayerEvent, Progress, StateChange};
pub use ticker::{format_hms, ProgressTicker, SessionClock, UNKNOWN_DURATION};

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{AppConfig, FocusConfig, PlaybackConfig};
use crate::engine::{EngineEventSink, PlaybackEngine, TransportEvent};
use crate::error::{PlayerError, Result};
use crate::focus::{AudioFocusArbiter, FocusCallback, FocusChange, FocusHost, GrantingFocusHost};
use crate::source::StreamSource;
use crate::store::{MemoryStore, PlaybackStore};
use machine::StreamStateMachine;

/// Everything the player task consumes, in arrival order
#[derive(Debug)]
pub(crate) enum Input {
    Command(Command),
    Transport(TransportEvent),
    Focus(FocusChange),
    Tick { generation: u64 },
    SessionClockExpired { generation: u64 },
    Shutdown { ack: oneshot::Sender<()> },
}

#[derive(Debug)]
pub(crate) enum Command {
    Play {
        reply: Option<oneshot::Sender<std::result::Result<(), PlayerError>>>,
    },
    Pause,
    Stop,
    Configure {
        source: StreamSource,
        reply: oneshot::Sender<std::result::Result<(), PlayerError>>,
    },
}

/// Cloneable command inlet and state outlet for one player
#[derive(Clone)]
pub struct PlayerHandle {
    inlet: mpsc::UnboundedSender<Input>,
    publisher: StatePublisher,
}

impl PlayerHandle {
    fn send(&self, command: Command) -> std::result::Result<(), PlayerError> {
        self.inlet
            .send(Input::Command(command))
            .map_err(|_| PlayerError::Closed)
    }

    /// Queue a play request. The outcome arrives through subscriptions.
    pub fn play(&self) -> std::result::Result<(), PlayerError> {
        self.send(Command::Play { reply: None })
    }

    pub fn pause(&self) -> std::result::Result<(), PlayerError> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> std::result::Result<(), PlayerError> {
        self.send(Command::Stop)
    }

    /// Play and wait for the verdict.
    ///
    /// Fails with [`PlayerError::FocusDenied`] when the host refuses audio
    /// focus; the state is unchanged in that case.
    pub async fn request_play(&self) -> std::result::Result<(), PlayerError> {
        let (reply, verdict) = oneshot::channel();
        self.send(Command::Play { reply: Some(reply) })?;
        verdict.await.map_err(|_| PlayerError::Closed)?
    }

    /// Bind a new stream. Any running session is stopped first.
    pub async fn reconfigure(&self, source: StreamSource) -> std::result::Result<(), PlayerError> {
        let (reply, verdict) = oneshot::channel();
        self.send(Command::Configure { source, reply })?;
        verdict.await.map_err(|_| PlayerError::Closed)?
    }

    pub fn state(&self) -> PlaybackState {
        self.publisher.current().state
    }

    pub fn current(&self) -> StateChange {
        self.publisher.current()
    }

    pub fn subscribe(&self, id: impl Into<ObserverId>) -> Subscription {
        self.publisher.subscribe(id)
    }

    pub fn unsubscribe(&self, id: &ObserverId) -> bool {
        self.publisher.unsubscribe(id)
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    /// Inlet for the host's audio focus notifications
    pub fn focus_callback(&self) -> FocusCallback {
        FocusCallback::new(self.inlet.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.inlet.is_closed()
    }
}

/// Assembles a player around an engine
pub struct PlayerBuilder {
    engine: Box<dyn PlaybackEngine>,
    source: StreamSource,
    playback: PlaybackConfig,
    focus: FocusConfig,
    focus_host: Arc<dyn FocusHost>,
    store: Arc<dyn PlaybackStore>,
    publisher: Option<StatePublisher>,
}

impl PlayerBuilder {
    pub fn new(engine: impl PlaybackEngine) -> Self {
        let defaults = AppConfig::default();
        Self {
            engine: Box::new(engine),
            source: defaults.stream.uri,
            playback: defaults.playback,
            focus: defaults.focus,
            focus_host: Arc::new(GrantingFocusHost),
            store: Arc::new(MemoryStore::new()),
            publisher: None,
        }
    }

    /// Take the stream, playback and focus sections from an application config
    pub fn config(mut self, config: &AppConfig) -> Self {
        self.source = config.stream.uri.clone();
        self.playback = config.playback.clone();
        self.focus = config.focus.clone();
        self
    }

    pub fn source(mut self, source: impl Into<StreamSource>) -> Self {
        self.source = source.into();
        self
    }

    pub fn playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    pub fn focus_config(mut self, focus: FocusConfig) -> Self {
        self.focus = focus;
        self
    }

    pub fn focus_host(mut self, host: Arc<dyn FocusHost>) -> Self {
        self.focus_host = host;
        self
    }

    pub fn store(mut self, store: Arc<dyn PlaybackStore>) -> Self {
        self.store = store;
        self
    }

    /// Share an existing publisher, e.g. one created before the player
    pub fn publisher(mut self, publisher: StatePublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Bind the engine and start the player task.
    ///
    /// Must be called from within a Tokio runtime. A malformed source is
    /// rejected here, before anything is spawned.
    pub fn spawn(self) -> Result<Player> {
        let PlayerBuilder {
            mut engine,
            source,
            playback,
            focus,
            focus_host,
            store,
            publisher,
        } = self;

        let (tx, rx) = mpsc::unbounded_channel();

        // Engine callbacks must not keep the queue alive on their own
        let events = tx.downgrade();
        engine.bind_events(EngineEventSink::new(move |event| {
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(Input::Transport(event));
            }
        }));
        engine.configure(source.clone())?;

        let publisher = publisher.unwrap_or_else(|| StatePublisher::new(playback.publisher_buffer));
        let ticker = ProgressTicker::new(
            playback.tick_interval(),
            playback.session_limit(),
            tx.downgrade(),
        );
        let arbiter = AudioFocusArbiter::new(focus_host, &focus);
        let machine = StreamStateMachine::new(engine, arbiter, publisher.clone(), ticker, store);

        info!(
            "Player started for {} (auto-play {}, session limit {:?})",
            source,
            playback.auto_play_on_start,
            playback.session_limit()
        );
        let task = tokio::spawn(machine.run(rx, playback.auto_play_on_start));

        Ok(Player {
            handle: PlayerHandle {
                inlet: tx,
                publisher,
            },
            task,
        })
    }
}

/// Owner of the player task
pub struct Player {
    handle: PlayerHandle,
    task: JoinHandle<()>,
}

impl Player {
    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Stop playback, release the engine and wait for the task to finish
    pub async fn shutdown(self) {
        let (ack, done) = oneshot::channel();
        if self.handle.inlet.send(Input::Shutdown { ack }).is_ok() {
            let _ = done.await;
        } else {
            debug!("Player task already finished");
        }

        if let Err(e) = self.task.await {
            error!("Player task failed: {}", e);
        }
    }
}
