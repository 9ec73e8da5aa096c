//! Audio focus arbitration
//!
//! The host environment grants one application the right to produce audible
//! output. [`AudioFocusArbiter`] requests and abandons that right and turns the
//! host's focus-change notifications into playback actions for the state
//! machine. It never touches the engine itself.

pub mod host;

pub use host::{FocusCallback, FocusHost, GrantingFocusHost};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::FocusConfig;

/// Longest acceptable host arbitration before it is reported as a slow host
const SLOW_REQUEST_WARNING: Duration = Duration::from_millis(250);

/// Who holds audible output rights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusState {
    NoFocus,
    HasFocus,
    DuckedOrTransientLoss,
}

/// Notification from the host audio subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gained,
    LostPermanently,
    LostTransiently { duckable: bool },
}

/// What to do on a duckable transient loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuckPolicy {
    /// Treat it like any other transient loss
    Pause,
    /// Keep playing at reduced volume
    Duck,
}

/// Playback command derived from a focus change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusAction {
    None,
    Pause,
    Stop,
    Resume,
    Duck(f32),
    Unduck,
}

#[derive(Debug)]
struct FocusInner {
    state: FocusState,
    resume_on_gain: bool,
    /// A play was denied and the host may still grant it later
    play_on_grant: bool,
    ducked: bool,
}

/// Requests, abandons and interprets audio focus for one player
pub struct AudioFocusArbiter {
    host: Arc<dyn FocusHost>,
    policy: DuckPolicy,
    duck_volume: f32,
    inner: Mutex<FocusInner>,
}

impl AudioFocusArbiter {
    pub fn new(host: Arc<dyn FocusHost>, config: &FocusConfig) -> Self {
        Self {
            host,
            policy: config.duck_policy,
            duck_volume: config.duck_volume,
            inner: Mutex::new(FocusInner {
                state: FocusState::NoFocus,
                resume_on_gain: false,
                play_on_grant: false,
                ducked: false,
            }),
        }
    }

    /// Ask the host for exclusive output rights.
    ///
    /// Returns false if denied; audio output must not start in that case. A
    /// denied request stays pending until the host sends
    /// [`FocusChange::Gained`] or the play intent is cleared.
    pub fn request_focus(&self) -> bool {
        let asked = Instant::now();
        let granted = self.host.request_focus();
        let took = asked.elapsed();
        if took > SLOW_REQUEST_WARNING {
            warn!("Host focus arbitration took {:?}", took);
        }

        let mut inner = self.inner.lock();
        if granted {
            inner.state = FocusState::HasFocus;
            inner.play_on_grant = false;
            inner.ducked = false;
            debug!("Audio focus granted");
        } else {
            inner.play_on_grant = true;
            info!("Audio focus denied by host; waiting for a later grant");
        }
        granted
    }

    /// Give output rights back to the host. Safe to call at any time.
    pub fn abandon_focus(&self) {
        self.host.abandon_focus();

        let mut inner = self.inner.lock();
        if inner.state != FocusState::NoFocus {
            debug!("Abandoning audio focus");
        }
        inner.state = FocusState::NoFocus;
        inner.resume_on_gain = false;
        inner.play_on_grant = false;
        inner.ducked = false;
    }

    /// Translate a host notification into a playback action.
    ///
    /// `playing` is whether output was running (or about to run) when the
    /// change arrived.
    pub fn on_focus_change(&self, change: FocusChange, playing: bool) -> FocusAction {
        let mut inner = self.inner.lock();

        let action = match change {
            FocusChange::Gained => {
                inner.state = FocusState::HasFocus;
                if inner.ducked {
                    inner.ducked = false;
                    FocusAction::Unduck
                } else if inner.resume_on_gain || inner.play_on_grant {
                    inner.resume_on_gain = false;
                    inner.play_on_grant = false;
                    FocusAction::Resume
                } else {
                    FocusAction::None
                }
            }
            FocusChange::LostPermanently => {
                inner.state = FocusState::NoFocus;
                inner.resume_on_gain = false;
                inner.play_on_grant = false;
                inner.ducked = false;
                FocusAction::Stop
            }
            FocusChange::LostTransiently { duckable } => {
                inner.state = FocusState::DuckedOrTransientLoss;
                if duckable && playing && self.policy == DuckPolicy::Duck {
                    inner.ducked = true;
                    FocusAction::Duck(self.duck_volume)
                } else {
                    // A repeated loss while already paused keeps the earlier intent
                    inner.resume_on_gain = playing || inner.resume_on_gain;
                    inner.ducked = false;
                    FocusAction::Pause
                }
            }
        };

        debug!(
            "Focus change {:?} -> {:?} (state {:?}, resume_on_gain {})",
            change, action, inner.state, inner.resume_on_gain
        );
        action
    }

    /// Forget any pending resume or deferred play, e.g. after the user
    /// paused explicitly
    pub fn clear_resume(&self) {
        let mut inner = self.inner.lock();
        inner.resume_on_gain = false;
        inner.play_on_grant = false;
    }

    pub fn state(&self) -> FocusState {
        self.inner.lock().state
    }

    pub fn resume_on_gain(&self) -> bool {
        self.inner.lock().resume_on_gain
    }

    /// True while focus is lost transiently and output is not merely ducked
    pub fn is_suspended(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == FocusState::DuckedOrTransientLoss && !inner.ducked
    }
}
