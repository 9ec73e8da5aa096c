//! Test helpers for player integration tests
//!
//! - FakeEngine: records every call and lets the test inject transport events
//! - FakeFocusHost: switchable grant/deny with call counters
//! - Subscription helpers for waiting on published states

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use radio_core::config::{FocusConfig, PlaybackConfig};
use radio_core::engine::{EngineEventSink, Position};
use radio_core::focus::FocusHost;
use radio_core::player::{Player, PlayerBuilder, PlayerEvent, StatePublisher, Subscription};
use radio_core::store::MemoryStore;
use radio_core::{EngineError, EngineEvent, PlaybackEngine, PlaybackState, SessionId, StreamSource};

pub const TEST_URI: &str = "http://radio.test/live.mp3";

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Configure(String),
    Start(SessionId),
    Pause,
    Stop,
    Release,
    SetVolume(f32),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EngineCall>,
    events: Option<EngineEventSink>,
    next_session: u64,
    current: Option<SessionId>,
    position: Option<Duration>,
    fail_start: bool,
    released: bool,
}

/// Scripted engine. Nothing happens on its own; the test drives it through
/// [`EngineControl`].
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side view of a [`FakeEngine`]
#[derive(Clone)]
pub struct EngineControl {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> (Self, EngineControl) {
        let state = Arc::new(Mutex::new(FakeState::default()));
        (
            Self {
                state: state.clone(),
            },
            EngineControl { state },
        )
    }
}

impl FakeEngine {
    fn live(&self) -> Result<parking_lot::MutexGuard<'_, FakeState>, EngineError> {
        let state = self.state.lock();
        if state.released {
            return Err(EngineError::EngineReleased);
        }
        Ok(state)
    }
}

impl PlaybackEngine for FakeEngine {
    fn bind_events(&mut self, events: EngineEventSink) {
        self.state.lock().events = Some(events);
    }

    fn configure(&mut self, source: StreamSource) -> Result<(), EngineError> {
        let mut state = self.live()?;
        source.validate()?;
        state.calls.push(EngineCall::Configure(source.as_str().to_string()));
        Ok(())
    }

    fn start(&mut self) -> Result<SessionId, EngineError> {
        let mut state = self.live()?;
        if state.fail_start {
            return Err(EngineError::Transport("scripted start failure".to_string()));
        }
        state.next_session += 1;
        let session = SessionId(state.next_session);
        state.current = Some(session);
        state.calls.push(EngineCall::Start(session));
        Ok(session)
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.live()?.calls.push(EngineCall::Pause);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        let mut state = self.live()?;
        state.current = None;
        state.calls.push(EngineCall::Stop);
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        if !state.released {
            state.released = true;
            state.current = None;
            state.calls.push(EngineCall::Release);
        }
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.live()?.calls.push(EngineCall::SetVolume(volume));
        Ok(())
    }

    fn position(&self) -> Result<Position, EngineError> {
        let state = self.live()?;
        Ok(match (state.current, state.position) {
            (Some(_), Some(position)) => Position::Known(position),
            _ => Position::Unknown,
        })
    }

    fn duration(&self) -> Result<Position, EngineError> {
        self.live()?;
        Ok(Position::Unknown)
    }
}

impl EngineControl {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn start_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Start(_)))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|call| *call == EngineCall::Stop)
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| pred(call)).count()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.state.lock().current
    }

    pub fn set_position(&self, position: Option<Duration>) {
        self.state.lock().position = position;
    }

    pub fn fail_next_starts(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Raise an event for the live session, if any
    pub fn emit(&self, event: EngineEvent) {
        let current = self.state.lock().current;
        if let Some(session) = current {
            self.emit_for(session, event);
        }
    }

    /// Raise an event as if produced by `session`
    pub fn emit_for(&self, session: SessionId, event: EngineEvent) {
        // The sink enqueues into the player; never call it under our lock
        let sink = self.state.lock().events.clone();
        if let Some(sink) = sink {
            sink.emit(session, event);
        }
    }
}

/// Focus host whose answer can be flipped by the test
#[derive(Default)]
pub struct FakeFocusHost {
    deny: AtomicBool,
    pub requests: AtomicUsize,
    pub abandons: AtomicUsize,
}

impl FakeFocusHost {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        let host = Self::default();
        host.deny.store(true, Ordering::SeqCst);
        Arc::new(host)
    }

    pub fn set_grant(&self, grant: bool) {
        self.deny.store(!grant, Ordering::SeqCst);
    }

    pub fn abandon_count(&self) -> usize {
        self.abandons.load(Ordering::SeqCst)
    }
}

impl FocusHost for FakeFocusHost {
    fn request_focus(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        !self.deny.load(Ordering::SeqCst)
    }

    fn abandon_focus(&self) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a test needs to drive and observe one player
pub struct Harness {
    pub player: Player,
    pub engine: EngineControl,
    pub host: Arc<FakeFocusHost>,
    pub store: Arc<MemoryStore>,
    /// Subscribed before the player task started, so it sees cold-start events
    pub events: Subscription,
}

pub struct HarnessBuilder {
    host: Arc<FakeFocusHost>,
    store: Arc<MemoryStore>,
    playback: PlaybackConfig,
    focus: FocusConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            host: FakeFocusHost::granting(),
            store: Arc::new(MemoryStore::new()),
            playback: PlaybackConfig {
                session_limit_hours: 0,
                ..PlaybackConfig::default()
            },
            focus: FocusConfig::default(),
        }
    }

    pub fn host(mut self, host: Arc<FakeFocusHost>) -> Self {
        self.host = host;
        self
    }

    pub fn store(mut self, store: MemoryStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    pub fn focus(mut self, focus: FocusConfig) -> Self {
        self.focus = focus;
        self
    }

    pub fn spawn(self) -> Harness {
        let (engine, control) = FakeEngine::new();
        let publisher = StatePublisher::new(256);
        let events = publisher.subscribe("test");

        let player = PlayerBuilder::new(engine)
            .source(TEST_URI)
            .playback(self.playback)
            .focus_config(self.focus)
            .focus_host(self.host.clone())
            .store(self.store.clone())
            .publisher(publisher)
            .spawn()
            .expect("player spawns");

        Harness {
            player,
            engine: control,
            host: self.host,
            store: self.store,
            events,
        }
    }
}

/// Let the player task drain its queue.
///
/// Tests run on the current-thread runtime, so yielding hands control to the
/// player task.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Next published state, skipping progress and other non-transition events
pub async fn next_state(events: &mut Subscription) -> PlaybackState {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a state change")
            .expect("subscription closed");
        if let Some(state) = event.state() {
            return state;
        }
    }
}

/// Next event that is not a progress report
pub async fn next_event(events: &mut Subscription) -> PlayerEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("subscription closed");
        if !matches!(event, PlayerEvent::Progress(_)) {
            return event;
        }
    }
}

/// States already delivered, without waiting
pub fn drain_states(events: &mut Subscription) -> Vec<PlaybackState> {
    let mut states = Vec::new();
    while let Some(event) = events.try_recv() {
        if let Some(state) = event.state() {
            states.push(state);
        }
    }
    states
}
