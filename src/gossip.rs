//! Gossip dissemination engine: an update queue piggybacked onto a
//! periodic fanout, plus immediate unicast "dispute broadcast" for
//! disputes and SUSPECT notifications.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::MembershipConfig;
use crate::model::ImmutableMember;
use crate::registry::Registry;
use crate::transport::{UnicastTransport, TOPIC_GOSSIP};

/// Accumulates `ImmutableMember` copies from the reconciler; drained
/// atomically on every gossip tick. Bounded, dropping the oldest entry
/// on overflow rather than growing without limit.
pub struct UpdateQueue {
    updates: Mutex<Vec<ImmutableMember>>,
    capacity: usize,
}

impl UpdateQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn enqueue(&self, update: ImmutableMember) {
        let mut updates = self.updates.lock();
        if updates.len() >= self.capacity {
            warn!(capacity = self.capacity, "gossip update queue full, dropping oldest entry");
            updates.remove(0);
        }
        updates.push(update);
    }

    /// Snapshots and clears the queue, returning what was pending.
    pub fn drain(&self) -> Vec<ImmutableMember> {
        let mut updates = self.updates.lock();
        std::mem::take(&mut *updates)
    }

    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct GossipEngine {
    registry: Arc<Registry>,
    transport: Arc<dyn UnicastTransport>,
    config: MembershipConfig,
}

impl GossipEngine {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn UnicastTransport>, config: MembershipConfig) -> Self {
        Self { registry, transport, config }
    }

    /// Sends `updates` to the first `gossip_fanout` peers of a fresh
    /// shuffle of the registry's peer list. No-op on an empty batch or
    /// an empty peer list.
    pub async fn gossip(&self, updates: Vec<ImmutableMember>) {
        if updates.is_empty() {
            return;
        }

        let peers = self.registry.shuffled_peers();
        if peers.is_empty() {
            return;
        }

        let payload = encode(&updates);
        for peer_id in peers.into_iter().take(self.config.gossip_fanout) {
            if let Some(peer) = self.registry.get(&peer_id) {
                self.transport.unicast(peer.address, TOPIC_GOSSIP, payload.clone()).await;
            }
        }
    }

    /// Unicasts a single-entry update to every non-local registry
    /// member. Used for dispute and SUSPECT notifications.
    pub async fn broadcast(&self, update: ImmutableMember) {
        let payload = encode(&[update]);
        for peer_id in self.registry.shuffled_peers() {
            if let Some(peer) = self.registry.get(&peer_id) {
                self.transport.unicast(peer.address, TOPIC_GOSSIP, payload.clone()).await;
            }
        }
    }

    /// Unicasts a single-entry update to exactly one random peer (the
    /// `notifySuspect` immediate-gossip path).
    pub async fn notify_one(&self, update: ImmutableMember) {
        let Some(peer_id) = self.registry.shuffled_peers().into_iter().next() else {
            return;
        };
        let Some(peer) = self.registry.get(&peer_id) else {
            return;
        };
        let payload = encode(&[update]);
        self.transport.unicast(peer.address, TOPIC_GOSSIP, payload).await;
    }
}

pub fn encode(updates: &[ImmutableMember]) -> Vec<u8> {
    crate::wire::encode(&updates)
}

pub fn decode(payload: &[u8]) -> Result<Vec<ImmutableMember>, String> {
    crate::wire::decode(payload)
}
