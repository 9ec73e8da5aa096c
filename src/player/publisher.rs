//! Fan-out of player events to independent observers
//!
//! Every observer owns a bounded queue. Publishing never waits: when an
//! observer's queue is full the event is dropped for that observer only, and a
//! closed queue removes the subscription. Per-observer order always matches
//! publication order.

use chrono::Utc;
use dashmap::DashMap;
use futures_util::Stream;
use parking_lot::RwLock;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::state::{PlaybackState, PlayerEvent, StateChange};

/// Name of a subscribed observer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(String);

impl ObserverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh unique id for anonymous observers such as socket clients
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObserverId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ObserverId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

struct Slot {
    /// Distinguishes a replaced subscription from its successor
    token: u64,
    tx: mpsc::Sender<PlayerEvent>,
}

struct PublisherInner {
    subscribers: DashMap<ObserverId, Slot>,
    current: RwLock<StateChange>,
    sequence: AtomicU64,
    next_token: AtomicU64,
    dropped: AtomicU64,
    buffer: usize,
}

impl PublisherInner {
    fn remove(&self, id: &ObserverId, token: u64) -> bool {
        self.subscribers
            .remove_if(id, |_, slot| slot.token == token)
            .is_some()
    }
}

/// Subscription registry carrying player events to observers
#[derive(Clone)]
pub struct StatePublisher {
    inner: Arc<PublisherInner>,
}

impl StatePublisher {
    /// `buffer` is the queue depth of each subscription
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                subscribers: DashMap::new(),
                current: RwLock::new(StateChange::initial()),
                sequence: AtomicU64::new(0),
                next_token: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Attach an observer. An existing subscription under the same id is
    /// replaced and its stream ends.
    pub fn subscribe(&self, id: impl Into<ObserverId>) -> Subscription {
        let id = id.into();
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        if self
            .inner
            .subscribers
            .insert(id.clone(), Slot { token, tx })
            .is_some()
        {
            debug!("Observer {} resubscribed; previous subscription closed", id);
        } else {
            debug!("Observer {} subscribed", id);
        }

        Subscription {
            id,
            token,
            rx,
            publisher: Arc::downgrade(&self.inner),
        }
    }

    /// Detach an observer. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: &ObserverId) -> bool {
        let removed = self.inner.subscribers.remove(id).is_some();
        if removed {
            debug!("Observer {} unsubscribed", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Latest published transition
    pub fn current(&self) -> StateChange {
        self.inner.current.read().clone()
    }

    /// Events dropped because an observer fell behind
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Record and broadcast a transition
    pub(crate) fn publish_state(&self, state: PlaybackState) -> StateChange {
        let change = {
            let mut current = self.inner.current.write();
            *current = StateChange {
                state,
                timestamp: Utc::now(),
                sequence: self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            };
            current.clone()
        };
        self.publish(PlayerEvent::StateChanged(change.clone()));
        change
    }

    pub(crate) fn publish(&self, event: PlayerEvent) {
        let mut closed = Vec::new();

        for entry in self.inner.subscribers.iter() {
            match entry.value().tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Observer {} is lagging; event dropped", entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push((entry.key().clone(), entry.value().token));
                }
            }
        }

        // Removal must wait until the iterator's shard locks are released
        for (id, token) in closed {
            if self.inner.remove(&id, token) {
                debug!("Observer {} went away; subscription removed", id);
            }
        }
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_PUBLISHER_BUFFER)
    }
}

/// Stream of events for one observer.
///
/// Dropping it detaches the observer.
pub struct Subscription {
    id: ObserverId,
    token: u64,
    rx: mpsc::Receiver<PlayerEvent>,
    publisher: Weak<PublisherInner>,
}

impl Subscription {
    pub fn id(&self) -> &ObserverId {
        &self.id
    }

    /// Next event, or `None` once unsubscribed or the publisher is gone
    pub async fn recv(&mut self) -> Option<PlayerEvent> {
        self.rx.recv().await
    }

    /// Next already-delivered event, without waiting
    pub fn try_recv(&mut self) -> Option<PlayerEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = PlayerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.publisher.upgrade() {
            inner.remove(&self.id, self.token);
        }
    }
}
