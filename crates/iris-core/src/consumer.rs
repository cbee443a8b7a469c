//! UI consumers of the pose stream and the registry that picks the active one.
//!
//! The streamer never talks to a windowing system directly. It asks an
//! [`ActiveConsumerLookup`] for "whoever is focused right now" on every tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use crate::error::DeliveryError;
use crate::types::PoseFrame;

/// A UI surface that can receive pose frames.
pub trait PoseConsumer: Send + Sync {
    /// Hand over one frame. Must not block.
    fn deliver(&self, frame: &PoseFrame) -> Result<(), DeliveryError>;
}

/// Resolves the consumer that should receive the next frame, if any.
pub trait ActiveConsumerLookup: Send + Sync {
    fn active(&self) -> Option<Arc<dyn PoseConsumer>>;
}

impl<F> ActiveConsumerLookup for F
where
    F: Fn() -> Option<Arc<dyn PoseConsumer>> + Send + Sync,
{
    fn active(&self) -> Option<Arc<dyn PoseConsumer>> {
        self()
    }
}

/// Consumer backed by a bounded channel. A full channel drops the frame.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<PoseFrame>,
}

impl ChannelConsumer {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PoseFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl PoseConsumer for ChannelConsumer {
    fn deliver(&self, frame: &PoseFrame) -> Result<(), DeliveryError> {
        match self.tx.try_send(frame.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::Backpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Gone),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub u64);

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

struct Entry {
    id: ConsumerId,
    consumer: Arc<dyn PoseConsumer>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    /// Registration order; the last entry is the most recent.
    entries: Vec<Entry>,
    focused: Option<ConsumerId>,
}

/// Registry of attached UI surfaces.
///
/// The focused consumer is active; without an explicit focus the most
/// recently registered one is. When the last consumer leaves, waiters on
/// [`ConsumerRegistry::wait_all_closed`] are woken.
#[derive(Default)]
pub struct ConsumerRegistry {
    inner: Mutex<RegistryInner>,
    all_closed: Notify,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a consumer and give it focus.
    pub fn register(&self, consumer: Arc<dyn PoseConsumer>) -> ConsumerId {
        let mut inner = self.lock();
        let id = ConsumerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(Entry { id, consumer });
        inner.focused = Some(id);
        debug!(%id, consumers = inner.entries.len(), "consumer registered");
        id
    }

    /// Move focus to `id`. Returns `false` if it is not registered.
    pub fn focus(&self, id: ConsumerId) -> bool {
        let mut inner = self.lock();
        if inner.entries.iter().any(|e| e.id == id) {
            inner.focused = Some(id);
            true
        } else {
            false
        }
    }

    /// Detach a consumer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ConsumerId) -> bool {
        let remaining = {
            let mut inner = self.lock();
            let Some(pos) = inner.entries.iter().position(|e| e.id == id) else {
                return false;
            };
            inner.entries.remove(pos);
            if inner.focused == Some(id) {
                inner.focused = None;
            }
            inner.entries.len()
        };

        debug!(%id, consumers = remaining, "consumer unregistered");
        if remaining == 0 {
            info!("all consumers closed");
            self.all_closed.notify_one();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once the registry has gone from non-empty to empty.
    ///
    /// A transition that happens while nobody is waiting is remembered for
    /// the next call.
    pub async fn wait_all_closed(&self) {
        self.all_closed.notified().await;
    }
}

impl ActiveConsumerLookup for ConsumerRegistry {
    fn active(&self) -> Option<Arc<dyn PoseConsumer>> {
        let inner = self.lock();
        let entry = match inner.focused {
            Some(id) => inner.entries.iter().find(|e| e.id == id),
            None => inner.entries.last(),
        };
        entry.map(|e| Arc::clone(&e.consumer))
    }
}
