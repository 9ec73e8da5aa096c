//! Host-side audio focus providers

use tokio::sync::mpsc;
use tracing::debug;

use super::FocusChange;
use crate::player::Input;

/// The host's audio arbitration service.
///
/// `request_focus` must return within a bounded time; a host that may block
/// indefinitely has to answer `false` and deliver a later
/// [`FocusChange::Gained`] through [`FocusCallback`] instead. The denied play
/// stays pending until that grant arrives, or until the user stops or pauses.
pub trait FocusHost: Send + Sync + 'static {
    fn request_focus(&self) -> bool;

    fn abandon_focus(&self);
}

/// Host without arbitration: every request is granted
#[derive(Debug, Default)]
pub struct GrantingFocusHost;

impl FocusHost for GrantingFocusHost {
    fn request_focus(&self) -> bool {
        true
    }

    fn abandon_focus(&self) {}
}

/// Handle through which the host delivers focus notifications.
///
/// Only enqueues; the change is applied in order with user commands and engine
/// events by the player task.
#[derive(Clone)]
pub struct FocusCallback {
    inlet: mpsc::UnboundedSender<Input>,
}

impl FocusCallback {
    pub(crate) fn new(inlet: mpsc::UnboundedSender<Input>) -> Self {
        Self { inlet }
    }

    pub fn on_focus_change(&self, change: FocusChange) {
        if self.inlet.send(Input::Focus(change)).is_err() {
            debug!("Focus change {:?} after player shut down", change);
        }
    }
}
