//! Progress reporting and the session length limit
//!
//! The ticker has no transport authority. Its timer task only enqueues ticks;
//! the player samples the engine on each tick and hands the position back here.
//! When the session limit is reached the ticker raises
//! `SessionClockExpired` into the player's queue and leaves stopping to the
//! state machine.

use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::state::Progress;
use super::Input;
use crate::engine::Position;

/// Placeholder when there is nothing to count down to
pub const UNKNOWN_DURATION: &str = "--:--:--";

/// Elapsed playing time since the last transition into Playing
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
    limit: Option<Duration>,
}

impl SessionClock {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(elapsed))
    }

    pub fn is_expired(&self, elapsed: Duration) -> bool {
        self.limit.map_or(false, |limit| elapsed >= limit)
    }
}

/// Format as `HH:MM:SS`; hours are not wrapped
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub struct ProgressTicker {
    interval: Duration,
    limit: Option<Duration>,
    inlet: WeakUnboundedSender<Input>,
    /// Bumped on every start so stale ticks can be recognised
    generation: u64,
    clock: Option<SessionClock>,
    task: Option<JoinHandle<()>>,
    expiry_raised: bool,
}

impl ProgressTicker {
    pub(crate) fn new(
        interval: Duration,
        limit: Option<Duration>,
        inlet: WeakUnboundedSender<Input>,
    ) -> Self {
        Self {
            // A zero period would make the interval timer panic
            interval: interval.max(Duration::from_millis(1)),
            limit,
            inlet,
            generation: 0,
            clock: None,
            task: None,
            expiry_raised: false,
        }
    }

    /// Reset the session clock and begin ticking
    pub fn start(&mut self) {
        self.halt();

        self.generation += 1;
        self.clock = Some(SessionClock::start(self.limit));
        self.expiry_raised = false;

        let generation = self.generation;
        let period = self.interval;
        let inlet = self.inlet.clone();

        self.task = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let Some(tx) = inlet.upgrade() else { break };
                if tx.send(Input::Tick { generation }).is_err() {
                    break;
                }
            }
        }));

        debug!("Progress ticker started (generation {})", generation);
    }

    /// Cancel ticking and discard the session clock
    pub fn halt(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Progress ticker halted (generation {})", self.generation);
        }
        self.clock = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Build the progress report for a tick.
    ///
    /// `position` is the engine's sampled position; the session clock is used
    /// when the engine cannot measure. Returns `None` for stale ticks.
    pub(crate) fn on_tick(
        &mut self,
        generation: u64,
        position: Position,
        duration: Position,
    ) -> Option<Progress> {
        if generation != self.generation {
            return None;
        }
        let clock = self.clock?;

        let elapsed = position.known().unwrap_or_else(|| clock.elapsed());

        let remaining = match clock.remaining(elapsed) {
            Some(remaining) => format_hms(remaining),
            None => duration
                .known()
                .map(format_hms)
                .unwrap_or_else(|| UNKNOWN_DURATION.to_string()),
        };

        if clock.is_expired(elapsed) && !self.expiry_raised {
            self.expiry_raised = true;
            info!(
                "Session limit of {:?} reached after {}",
                clock.limit().unwrap_or_default(),
                format_hms(elapsed)
            );
            if let Some(tx) = self.inlet.upgrade() {
                let _ = tx.send(Input::SessionClockExpired { generation });
            }
        }

        Some(Progress {
            elapsed: format_hms(elapsed),
            remaining,
            elapsed_secs: elapsed.as_secs(),
        })
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.halt();
    }
}
