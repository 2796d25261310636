// ABOUTME: Event bus fanning button events out to every live subscriber.
// ABOUTME: Broadcast snapshots the set, delivers outside the lock, then drops whoever failed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use stopmo_core::ButtonEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use ulid::Ulid;

pub type SubscriberId = Ulid;

/// Why a delivery to one subscriber failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber connection is closed")]
    Closed,

    #[error("subscriber did not accept the event within {0:?}")]
    TimedOut(Duration),
}

/// A live connection that can be handed events.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn deliver(&self, event: &ButtonEvent) -> Result<(), DeliveryError>;
}

/// Subscriber backed by a bounded queue drained by the connection task.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<ButtonEvent>,
    deadline: Duration,
}

impl ChannelSubscriber {
    /// Returns the subscriber and the receiving end for the connection task.
    pub fn new(capacity: usize, deadline: Duration) -> (Self, mpsc::Receiver<ButtonEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, deadline }, rx)
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn deliver(&self, event: &ButtonEvent) -> Result<(), DeliveryError> {
        self.tx
            .send_timeout(*event, self.deadline)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
                SendTimeoutError::Timeout(_) => DeliveryError::TimedOut(self.deadline),
            })
    }
}

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<SubscriberId>,
}

/// The set of live subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = Ulid::new();
        self.lock().insert(id, subscriber);
        tracing::debug!(subscriber = %id, "subscriber registered");
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "subscriber unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every subscriber registered at the time of the call.
    pub async fn broadcast(&self, event: &ButtonEvent) -> BroadcastReport {
        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .lock()
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(sub)))
            .collect();

        let results = join_all(snapshot.iter().map(|(id, sub)| async move {
            (*id, sub.deliver(event).await)
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::info!(subscriber = %id, "dropping subscriber: {}", e);
                    report.dropped.push(id);
                }
            }
        }

        if !report.dropped.is_empty() {
            let mut subscribers = self.lock();
            for id in &report.dropped {
                subscribers.remove(id);
            }
        }

        tracing::debug!(
            event = %event.kind,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "broadcast complete"
        );
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, Arc<dyn Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
