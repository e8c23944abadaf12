use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// Logical gossip channels. Payloads are JSON: a block array on
/// `Blockchain`, a single transaction on `Transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Blockchain,
    Transaction,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Blockchain, Channel::Transaction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Blockchain => "BLOCKCHAIN",
            Channel::Transaction => "TRANSACTION",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives messages published by other peers.
pub trait Subscriber: Send + Sync {
    fn peer_id(&self) -> &str;
    fn handle_message(&self, channel: Channel, message: &str);
}

/// Delivers a serialized payload to every known peer except its origin.
/// Best effort: no acknowledgement, no retries.
pub trait Transport: Send + Sync {
    fn publish(&self, origin: &str, channel: Channel, message: &str);
}

/// In-process transport. Delivery is synchronous on the publisher's
/// thread, so publishers must not hold their own state lock.
#[derive(Default)]
pub struct LocalBus {
    subscribers: RwLock<Vec<Weak<dyn Subscriber>>>,
}

impl LocalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        let mut subs = self.subscribers.write().expect("lock poisoned");
        subs.retain(|s| s.strong_count() > 0);
        subs.push(Arc::downgrade(&subscriber));
        debug!(
            "Peer {} subscribed to {:?} ({} peers)",
            subscriber.peer_id(),
            Channel::ALL,
            subs.len()
        );
    }

    pub fn peer_count(&self) -> usize {
        let subs = self.subscribers.read().expect("lock poisoned");
        subs.iter().filter(|s| s.strong_count() > 0).count()
    }
}

impl Transport for LocalBus {
    fn publish(&self, origin: &str, channel: Channel, message: &str) {
        // Collect first so handlers run without the bus lock held.
        let peers: Vec<Arc<dyn Subscriber>> = {
            let subs = self.subscribers.read().expect("lock poisoned");
            subs.iter().filter_map(Weak::upgrade).collect()
        };

        let mut delivered = 0;
        for peer in peers.iter().filter(|p| p.peer_id() != origin) {
            peer.handle_message(channel, message);
            delivered += 1;
        }
        if delivered == 0 {
            debug!("Message on {channel} from {origin} reached no peers");
        } else {
            debug!("Message on {channel} from {origin} delivered to {delivered} peers");
        }
    }
}
