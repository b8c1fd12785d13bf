//! Fan-out of published snapshots to live subscribers (SSE and WebSocket
//! connections). Each snapshot is serialized once and the same bytes are
//! pushed to every sink. A sink that errors is unregistered on the spot;
//! nothing is queued for slow clients beyond a small channel bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::Snapshot;

/// Snapshots a channel subscriber may have in flight before it is dropped.
pub const CHANNEL_BOUND: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("subscriber disconnected")]
    Closed,
    #[error("subscriber is not keeping up")]
    Full,
}

/// Anything a serialized snapshot can be pushed into without waiting.
pub trait SubscriberSink: Send {
    fn push(&mut self, payload: &Arc<str>) -> Result<(), SinkError>;
}

impl SubscriberSink for mpsc::Sender<Arc<str>> {
    fn push(&mut self, payload: &Arc<str>) -> Result<(), SinkError> {
        self.try_send(payload.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

type Registry = HashMap<SubscriberId, Box<dyn SubscriberSink>>;

#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    subscribers: Mutex<Registry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // a panicking sink must not take the whole fan-out down with it
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, sink: Box<dyn SubscriberSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry().insert(id, sink);
        debug!(%id, "subscriber added");
        id
    }

    /// Register a bounded channel and hand back its receiving end. Dropping
    /// the [`Subscription`] unregisters it.
    pub fn subscribe_channel(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(CHANNEL_BOUND);
        let id = self.subscribe(Box::new(tx));
        Subscription {
            id,
            rx,
            broadcaster: Arc::clone(self),
        }
    }

    /// Safe to call for an id that is already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry().remove(&id).is_some();
        if removed {
            debug!(%id, "subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize once and push to every sink. Returns how many received it.
    pub fn publish(&self, snapshot: &Snapshot) -> usize {
        match serde_json::to_string(snapshot) {
            Ok(json) => self.publish_json(Arc::from(json)),
            Err(e) => {
                warn!("snapshot serialization failed: {e}");
                0
            }
        }
    }

    pub fn publish_json(&self, payload: Arc<str>) -> usize {
        let mut registry = self.registry();
        let mut delivered = 0;
        registry.retain(|id, sink| match sink.push(&payload) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                debug!(%id, "dropping subscriber: {e}");
                false
            }
        });
        delivered
    }
}

/// A registered channel subscriber.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<str>>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next published payload; `None` once the broadcaster dropped us.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
