use crate::error::Error;
use dashmap::DashMap;
use log::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Subscription ids wrap back to zero when they reach this ceiling (2^53).
pub const MAX_SUBSCRIPTION_ID: u64 = 1 << 53;

/// Opaque handle identifying one live callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoked synchronously, once per publish, with `(event, data)`.
pub type Callback = Arc<dyn Fn(&str, &Value) -> Result<(), Error> + Send + Sync>;

/// Outcome of a single publish call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Callbacks that accepted the event.
    pub delivered: usize,
    /// Callbacks that returned an error. They were skipped, not retried.
    pub failed: usize,
}

impl Delivery {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Channel-partitioned publish/subscribe registry.
///
/// Implementations other than [`MemoryBroker`] (for example one backed by an external
/// pub/sub service) can be handed to [`ServerSentEvents`](crate::ServerSentEvents)
/// without changing how streams are opened or events are published.
pub trait Broker: Send + Sync {
    /// Register `callback` under `channel` and return its id. Never fails.
    fn subscribe(&self, channel: &str, callback: Callback) -> SubscriptionId;

    /// Remove the registration. Unknown ids and channels are ignored.
    fn unsubscribe(&self, id: SubscriptionId, channel: &str);

    /// Invoke every callback currently registered under `channel` exactly once before
    /// returning. Publishing to a channel without subscribers is a no-op.
    fn publish(&self, channel: &str, event: &str, data: &Value) -> Delivery;
}

/// In-process broker.
///
/// Channels are created on first subscription and dropped from the registry as soon as
/// their last subscriber leaves.
pub struct MemoryBroker {
    channels: DashMap<String, HashMap<SubscriptionId, Callback>>,
    next_id: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub(crate) fn starting_at(first_id: u64) -> Self {
        Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(first_id % MAX_SUBSCRIPTION_ID),
        }
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn allocate_id(&self) -> SubscriptionId {
        let previous = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(if current + 1 == MAX_SUBSCRIPTION_ID {
                    0
                } else {
                    current + 1
                })
            })
            .unwrap_or_else(|current| current);

        SubscriptionId(previous)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for MemoryBroker {
    fn subscribe(&self, channel: &str, callback: Callback) -> SubscriptionId {
        let id = self.allocate_id();

        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, callback);

        debug!("Subscribed {} to channel {:?}", id, channel);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId, channel: &str) {
        // Take the callback out while holding the shard lock, drop it after.
        let removed = self
            .channels
            .get_mut(channel)
            .and_then(|mut subscribers| subscribers.remove(&id));

        if removed.is_some() {
            debug!("Unsubscribed {} from channel {:?}", id, channel);
        }

        // Re-checked under the shard lock so a concurrent subscribe is never lost.
        if self
            .channels
            .remove_if(channel, |_, subscribers| subscribers.is_empty())
            .is_some()
        {
            trace!("Removed empty channel {:?}", channel);
        }
    }

    fn publish(&self, channel: &str, event: &str, data: &Value) -> Delivery {
        // Snapshot the callbacks so none of them runs while a shard lock is held.
        let callbacks: Vec<(SubscriptionId, Callback)> = match self.channels.get(channel) {
            Some(subscribers) => subscribers
                .iter()
                .map(|(id, callback)| (*id, Arc::clone(callback)))
                .collect(),
            None => return Delivery::default(),
        };

        let mut delivery = Delivery::default();
        for (id, callback) in callbacks {
            match callback(event, data) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver {:?} to subscriber {} on channel {:?}: {}",
                        event, id, channel, e
                    );
                    delivery.failed += 1;
                }
            }
        }

        delivery
    }
}
