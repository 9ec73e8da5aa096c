//! Stream state machine
//!
//! Owns the engine, the focus arbiter and the canonical [`PlaybackState`].
//! Inputs from every source arrive through one queue and are applied one at a
//! time, so each transition below is evaluated atomically:
//!
//! ```text
//!  Stopped/Paused --UserPlay (focus granted)----------> Loading
//!  Loading --------EngineBuffering--------------------> Loading
//!  Loading --------EngineStarted----------------------> Playing
//!  Playing --------UserPause / transient focus loss---> Paused
//!  Paused ---------FocusGained (resume-on-gain)-------> Loading
//!  Stopped/Paused --FocusGained (deferred play)-------> Loading
//!  Playing --------session limit / permanent loss-----> Stopped
//!  any ------------UserStop / EngineError-------------> Stopped
//! ```

use chrono::Utc;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::publisher::StatePublisher;
use super::state::{PlaybackState, PlayerEvent};
use super::ticker::ProgressTicker;
use super::{Command, Input};
use crate::engine::{EngineEvent, PlaybackEngine, Position, SessionId, TransportEvent};
use crate::error::PlayerError;
use crate::focus::{AudioFocusArbiter, FocusAction, FocusChange};
use crate::source::StreamSource;
use crate::store::PlaybackStore;

pub(crate) struct StreamStateMachine {
    state: PlaybackState,
    engine: Box<dyn PlaybackEngine>,
    arbiter: AudioFocusArbiter,
    publisher: StatePublisher,
    ticker: ProgressTicker,
    store: Arc<dyn PlaybackStore>,
    /// Session whose engine events are current; everything else is stale
    session: Option<SessionId>,
    /// Output volume is lowered for a duckable focus loss
    ducked: bool,
}

impl StreamStateMachine {
    pub(crate) fn new(
        engine: Box<dyn PlaybackEngine>,
        arbiter: AudioFocusArbiter,
        publisher: StatePublisher,
        ticker: ProgressTicker,
        store: Arc<dyn PlaybackStore>,
    ) -> Self {
        Self {
            state: PlaybackState::Stopped,
            engine,
            arbiter,
            publisher,
            ticker,
            store,
            session: None,
            ducked: false,
        }
    }

    /// Drain the input queue until shutdown or until every producer is gone
    pub(crate) async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>, auto_play: bool) {
        self.cold_start(auto_play);

        while let Some(input) = inputs.recv().await {
            if self.handle(input).is_break() {
                return;
            }
        }

        debug!("All player handles dropped");
        self.shutdown();
    }

    /// The previous process may have died mid-session; never trust the
    /// transport in that case and stop defensively before any auto-play.
    fn cold_start(&mut self, auto_play: bool) {
        let persisted = self.store.load();

        if !persisted.clean_shutdown {
            warn!(
                "Previous session ended uncleanly (last state {}); forcing stop",
                persisted.last_state
            );
            self.stop_session();
            self.transition(PlaybackState::Stopped);
        }

        if auto_play {
            info!("Auto-play on start");
            if let Err(e) = self.user_play() {
                warn!("Auto-play failed: {}", e);
            }
        }
    }

    fn handle(&mut self, input: Input) -> ControlFlow<()> {
        match input {
            Input::Command(Command::Play { reply }) => {
                let result = self.user_play();
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Input::Command(Command::Pause) => self.user_pause(),
            Input::Command(Command::Stop) => self.user_stop(),
            Input::Command(Command::Configure { source, reply }) => {
                let _ = reply.send(self.reconfigure(source));
            }
            Input::Transport(event) => self.on_transport(event),
            Input::Focus(change) => self.on_focus(change),
            Input::Tick { generation } => self.on_tick(generation),
            Input::SessionClockExpired { generation } => self.on_session_expired(generation),
            Input::Shutdown { ack } => {
                self.shutdown();
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn user_play(&mut self) -> Result<(), PlayerError> {
        match self.state {
            PlaybackState::Playing => {
                debug!("Play ignored: already playing");
                Ok(())
            }
            PlaybackState::Loading => {
                info!("Play while loading; superseding in-flight start");
                self.stop_engine();
                self.begin_loading()
            }
            PlaybackState::Stopped | PlaybackState::Paused => {
                if !self.arbiter.request_focus() {
                    warn!("Play rejected in {}: audio focus denied", self.state);
                    self.publisher.publish(PlayerEvent::FocusDenied {
                        timestamp: Utc::now(),
                    });
                    return Err(PlayerError::FocusDenied);
                }
                self.begin_loading()
            }
        }
    }

    fn user_pause(&mut self) {
        self.arbiter.clear_resume();

        if self.state == PlaybackState::Playing {
            if let Err(e) = self.engine.pause() {
                error!("Engine pause failed: {}", e);
            }
            self.transition(PlaybackState::Paused);
        } else {
            debug!("Pause ignored in {}", self.state);
        }
    }

    fn user_stop(&mut self) {
        info!("Stop requested in {}", self.state);
        self.stop_session();
        self.transition(PlaybackState::Stopped);
    }

    fn reconfigure(&mut self, source: StreamSource) -> Result<(), PlayerError> {
        if self.state != PlaybackState::Stopped {
            info!("Reconfiguring while {}; stopping first", self.state);
            self.user_stop();
        }
        self.engine.configure(source).map_err(PlayerError::from)
    }

    fn on_transport(&mut self, event: TransportEvent) {
        if self.session != Some(event.session) {
            debug!("Discarding {:?} from stale {}", event.event, event.session);
            return;
        }

        match event.event {
            EngineEvent::Buffering if self.state == PlaybackState::Loading => {
                self.transition(PlaybackState::Loading);
            }
            EngineEvent::Started if self.state == PlaybackState::Loading => {
                self.transition(PlaybackState::Playing);

                // Focus went away transiently while connecting
                if self.arbiter.is_suspended() {
                    info!("Focus lost during connect; pausing");
                    self.pause_for_focus();
                }
            }
            EngineEvent::Stopped
                if matches!(self.state, PlaybackState::Loading | PlaybackState::Playing) =>
            {
                self.fail("stream ended by server".to_string());
            }
            EngineEvent::TransportError(reason) => self.fail(reason),
            EngineEvent::Metadata(metadata) => {
                debug!("Stream metadata: {:?}", metadata);
                self.publisher.publish(PlayerEvent::Metadata(metadata));
            }
            other => debug!("Ignoring {:?} in {}", other, self.state),
        }
    }

    fn on_focus(&mut self, change: FocusChange) {
        let playing = matches!(self.state, PlaybackState::Playing | PlaybackState::Loading);

        match self.arbiter.on_focus_change(change, playing) {
            FocusAction::None => {}
            FocusAction::Pause => match self.state {
                PlaybackState::Playing => self.pause_for_focus(),
                PlaybackState::Loading => debug!("Transient focus loss while loading; pause deferred"),
                _ => {}
            },
            FocusAction::Stop => {
                if self.state != PlaybackState::Stopped {
                    info!("Audio focus lost permanently; stopping");
                    self.stop_session();
                    self.transition(PlaybackState::Stopped);
                }
            }
            FocusAction::Resume => {
                if matches!(self.state, PlaybackState::Paused | PlaybackState::Stopped) {
                    info!("Audio focus granted in {}; starting", self.state);
                    if let Err(e) = self.begin_loading() {
                        warn!("Resume failed: {}", e);
                    }
                }
            }
            FocusAction::Duck(volume) => {
                info!("Ducking output to {:.2}", volume);
                self.ducked = true;
                if let Err(e) = self.engine.set_volume(volume) {
                    error!("Engine volume change failed: {}", e);
                }
            }
            FocusAction::Unduck => self.restore_volume(),
        }
    }

    fn on_tick(&mut self, generation: u64) {
        if self.state != PlaybackState::Playing {
            return;
        }

        let position = self.engine.position().unwrap_or(Position::Unknown);
        let duration = self.engine.duration().unwrap_or(Position::Unknown);

        if let Some(progress) = self.ticker.on_tick(generation, position, duration) {
            self.publisher.publish(PlayerEvent::Progress(progress));
        }
    }

    fn on_session_expired(&mut self, generation: u64) {
        if self.state != PlaybackState::Playing || generation != self.ticker.generation() {
            debug!("Discarding stale session expiry (generation {})", generation);
            return;
        }

        info!("Session limit reached; stopping");
        self.stop_session();
        self.transition(PlaybackState::Stopped);
    }

    fn begin_loading(&mut self) -> Result<(), PlayerError> {
        self.mark_clean_shutdown(false);
        self.restore_volume();

        match self.engine.start() {
            Ok(session) => {
                debug!("Engine starting {}", session);
                self.session = Some(session);
                self.transition(PlaybackState::Loading);
                Ok(())
            }
            Err(e) => {
                self.fail(format!("engine failed to start: {}", e));
                Err(e.into())
            }
        }
    }

    fn pause_for_focus(&mut self) {
        if let Err(e) = self.engine.pause() {
            error!("Engine pause failed: {}", e);
        }
        self.transition(PlaybackState::Paused);
    }

    /// Error path: unconditional cleanup, then report and stop
    fn fail(&mut self, reason: String) {
        error!("Transport failure in {}: {}", self.state, reason);
        self.stop_session();
        self.publisher.publish(PlayerEvent::TransportError {
            reason,
            timestamp: Utc::now(),
        });
        self.transition(PlaybackState::Stopped);
    }

    fn stop_engine(&mut self) {
        self.session = None;
        if let Err(e) = self.engine.stop() {
            error!("Engine stop failed: {}", e);
        }
    }

    /// Tear down transport and focus, and record that it was deliberate
    fn stop_session(&mut self) {
        self.restore_volume();
        self.stop_engine();
        self.arbiter.abandon_focus();
        self.mark_clean_shutdown(true);
    }

    /// Undo a duck; a no-op at full volume
    fn restore_volume(&mut self) {
        if !std::mem::take(&mut self.ducked) {
            return;
        }
        info!("Restoring output volume");
        if let Err(e) = self.engine.set_volume(1.0) {
            error!("Engine volume change failed: {}", e);
        }
    }

    fn shutdown(&mut self) {
        info!("Player shutting down from {}", self.state);
        self.stop_session();
        self.engine.release();
        self.transition(PlaybackState::Stopped);
    }

    /// The only place the state changes. Every call publishes exactly once.
    fn transition(&mut self, next: PlaybackState) {
        let previous = std::mem::replace(&mut self.state, next);

        if next == PlaybackState::Playing {
            if previous != PlaybackState::Playing {
                self.ticker.start();
            }
        } else {
            self.ticker.halt();
        }

        if let Err(e) = self.store.set_last_state(next) {
            warn!("Failed to persist playback state: {}", e);
        }

        let change = self.publisher.publish_state(next);
        info!("{} -> {} (#{})", previous, next, change.sequence);
    }

    fn mark_clean_shutdown(&self, clean: bool) {
        if let Err(e) = self.store.set_clean_shutdown(clean) {
            warn!("Failed to persist clean-shutdown flag: {}", e);
        }
    }
}
