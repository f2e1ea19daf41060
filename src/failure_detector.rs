//! Direct probe, indirect probe-through-peers, and the suspicion
//! timeout that promotes SUSPECT to DEAD.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::MembershipConfig;
use crate::gossip::GossipEngine;
use crate::model::{ImmutableMember, Properties, State};
use crate::reconciler::Reconciler;
use crate::registry::Registry;
use crate::transport::{DiscoverySource, RequestResponseTransport, TOPIC_PROBE, TOPIC_PROBE_REQUEST};

pub struct FailureDetector {
    registry: Arc<Registry>,
    reconciler: Arc<Reconciler>,
    discovery: Arc<dyn DiscoverySource>,
    transport: Arc<dyn RequestResponseTransport>,
    gossip: Arc<GossipEngine>,
    config: MembershipConfig,
    round_robin: AtomicU64,
}

fn encode_member(member: &ImmutableMember) -> Vec<u8> {
    crate::wire::encode(member)
}

fn decode_member(payload: &[u8]) -> Result<ImmutableMember, String> {
    crate::wire::decode(payload)
}

fn decode_bool(payload: &[u8]) -> Result<bool, String> {
    crate::wire::decode(payload)
}

impl FailureDetector {
    pub fn new(
        registry: Arc<Registry>,
        reconciler: Arc<Reconciler>,
        discovery: Arc<dyn DiscoverySource>,
        transport: Arc<dyn RequestResponseTransport>,
        gossip: Arc<GossipEngine>,
        config: MembershipConfig,
    ) -> Self {
        Self {
            registry,
            reconciler,
            discovery,
            transport,
            gossip,
            config,
            round_robin: AtomicU64::new(0),
        }
    }

    /// Builds (discovered ∖ registry, sorted by id) ++ (shuffled
    /// registry peers), then picks one entry round-robin via the
    /// shared counter. No-op when the combined list is empty.
    pub async fn probe_one(&self) {
        let discovered = self.discovery.current_nodes().await;
        let mut unknown: Vec<_> = discovered
            .into_iter()
            .filter(|n| !self.registry.contains(&n.id))
            .collect();
        unknown.sort_by(|a, b| a.id.cmp(&b.id));

        let peers = self.registry.shuffled_peers();
        let combined_len = unknown.len() + peers.len();
        if combined_len == 0 {
            return;
        }

        let index = (self.round_robin.fetch_add(1, Ordering::Relaxed) as usize) % combined_len;

        let target = if index < unknown.len() {
            unknown[index].as_stub_member()
        } else {
            let peer_id = &peers[index - unknown.len()];
            match self.registry.get(peer_id) {
                Some(record) => record.snapshot(),
                None => return,
            }
        };

        self.probe(&target).await;
    }

    /// Probes every currently known peer once; used at join.
    pub async fn probe_all(&self) {
        for peer_id in self.registry.shuffled_peers() {
            if let Some(record) = self.registry.get(&peer_id) {
                self.probe(&record.snapshot()).await;
            }
        }
    }

    pub async fn probe(&self, target: &ImmutableMember) {
        let payload = encode_member(target);
        match self.transport.send_and_receive(target.address, TOPIC_PROBE, payload).await {
            Ok(reply) => match decode_member(&reply) {
                Ok(reply) => {
                    self.reconciler.update_state(&reply).await;
                }
                Err(e) => warn!(error = %e, id = %target.id, "malformed probe reply, treating as no response"),
            },
            Err(_) => {
                let still_same_term = self
                    .registry
                    .get(&target.id)
                    .map(|current| current.term == target.term)
                    .unwrap_or(false);

                if still_same_term {
                    self.request_probes(target).await;
                }
            }
        }
    }

    pub async fn request_probes(&self, suspect: &ImmutableMember) {
        let mut candidates = self.registry.shuffled_peers();
        candidates.retain(|id| id != &suspect.id);
        candidates.truncate(self.config.suspect_probes);

        let n = candidates.len();
        if n == 0 {
            return;
        }

        let payload = encode_member(suspect);
        let mut join_set: JoinSet<bool> = JoinSet::new();
        for peer_id in candidates {
            let Some(peer) = self.registry.get(&peer_id) else { continue };
            let transport = self.transport.clone();
            let payload = payload.clone();
            join_set.spawn(async move {
                match transport.send_and_receive(peer.address, TOPIC_PROBE_REQUEST, payload).await {
                    Ok(reply) => decode_bool(&reply).unwrap_or(false),
                    Err(_) => false,
                }
            });
        }

        let mut any_success = false;
        while let Some(result) = join_set.join_next().await {
            if matches!(result, Ok(true)) {
                any_success = true;
            }
        }

        if any_success {
            return;
        }

        let mut suspect_record = suspect.clone();
        suspect_record.state = State::Suspect;
        let accepted = self.reconciler.update_state(&suspect_record).await;

        if accepted && self.config.broadcast_updates {
            self.gossip.broadcast(suspect_record).await;
        }
    }

    /// Responds to an inbound probe with the local record, applying
    /// the dispute mechanism: a hostile probe (newer term, or a belief
    /// that the local node is SUSPECT) bumps the local term so the
    /// fresher record overrides the stale belief once it propagates.
    pub async fn handle_probe(&self, incoming: &ImmutableMember) -> ImmutableMember {
        let local_id = self.registry.local_id().clone();
        let Some(mut local) = self.registry.get(&local_id) else {
            return ImmutableMember {
                id: local_id,
                address: "0.0.0.0:0".parse().unwrap(),
                zone: None,
                rack: None,
                host: None,
                properties: Properties::new(),
                version: None,
                state: State::Dead,
                term: 0,
            };
        };

        let disputed = incoming.term > local.term || incoming.state == State::Suspect;
        if incoming.term > local.term {
            local.term = incoming.term + 1;
        } else if incoming.state == State::Suspect {
            local.term += 1;
        }

        if disputed {
            let snapshot = local.snapshot();
            self.registry.insert(local.clone());
            debug!(term = local.term, "dispute: local term advanced");
            if self.config.broadcast_disputes {
                self.gossip.broadcast(snapshot).await;
            }
        } else {
            self.registry.insert(local.clone());
        }

        local.snapshot()
    }

    /// Performs a direct probe of the nominated member; returns `true`
    /// iff a reply arrived without a transport error.
    pub async fn handle_probe_request(&self, suspect: &ImmutableMember) -> bool {
        let payload = encode_member(suspect);
        match self.transport.send_and_receive(suspect.address, TOPIC_PROBE, payload).await {
            Ok(reply) => match decode_member(&reply) {
                Ok(reply) => {
                    self.reconciler.update_state(&reply).await;
                    true
                }
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Demotes any SUSPECT record older than `failureTimeout` to DEAD
    /// and removes it. The only path that promotes SUSPECT to DEAD
    /// purely on local elapsed time.
    pub async fn check_failures(&self) {
        let now = SystemTime::now();
        let expired: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|record| {
                record.state == State::Suspect
                    && now
                        .duration_since(record.timestamp)
                        .map(|age| age >= self.config.failure_timeout)
                        .unwrap_or(false)
            })
            .collect();

        for record in expired {
            if let Some(removed) = self.registry.remove(&record.id) {
                let mut snapshot = removed.snapshot();
                snapshot.state = State::Dead;
                self.reconciler.emit_removed(snapshot).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::gossip::UpdateQueue;
    use crate::model::{MemberRecord, Properties};
    use crate::transport::DiscoveredNode;
    use std::time::Duration;

    struct EmptyDiscovery;
    #[async_trait::async_trait]
    impl DiscoverySource for EmptyDiscovery {
        async fn current_nodes(&self) -> Vec<DiscoveredNode> {
            Vec::new()
        }
    }

    struct FailingTransport;
    #[async_trait::async_trait]
    impl RequestResponseTransport for FailingTransport {
        async fn send_and_receive(&self, _to: crate::model::Address, _topic: &str, _payload: Vec<u8>) -> Result<Vec<u8>, String> {
            Err("unreachable".to_string())
        }
    }

    struct NullUnicast;
    #[async_trait::async_trait]
    impl crate::transport::UnicastTransport for NullUnicast {
        async fn unicast(&self, _to: crate::model::Address, _topic: &str, _payload: Vec<u8>) {}
    }

    struct RespondingTransport {
        responder_id: String,
        term: AtomicU64,
    }
    #[async_trait::async_trait]
    impl RequestResponseTransport for RespondingTransport {
        async fn send_and_receive(&self, to: crate::model::Address, _topic: &str, _payload: Vec<u8>) -> Result<Vec<u8>, String> {
            let reply = ImmutableMember {
                id: self.responder_id.clone(),
                address: to,
                zone: None,
                rack: None,
                host: None,
                properties: Properties::new(),
                version: None,
                state: State::Alive,
                term: self.term.load(Ordering::SeqCst),
            };
            Ok(encode_member(&reply))
        }
    }

    fn harness(transport: Arc<dyn RequestResponseTransport>) -> (Arc<Registry>, Arc<Reconciler>, FailureDetector) {
        let registry = Arc::new(Registry::new("local".to_string()));
        registry.insert(MemberRecord::local("local".to_string(), "127.0.0.1:7000".parse().unwrap(), Properties::new()));

        let events = Arc::new(EventBus::spawn());
        let queue = Arc::new(UpdateQueue::new(64));
        let config = MembershipConfig::default();
        let gossip = Arc::new(GossipEngine::new(registry.clone(), Arc::new(NullUnicast), config.clone()));
        let reconciler = Arc::new(Reconciler::new(registry.clone(), events, queue, gossip.clone(), config.clone(), Properties::new()));
        let detector = FailureDetector::new(registry.clone(), reconciler.clone(), Arc::new(EmptyDiscovery), transport, gossip, config);
        (registry, reconciler, detector)
    }

    #[tokio::test]
    async fn probe_one_with_empty_discovery_and_registry_is_noop() {
        let (_, _, detector) = harness(Arc::new(FailingTransport));
        detector.probe_one().await;
    }

    #[tokio::test]
    async fn probe_failure_triggers_indirect_fallback_and_zero_peers_noop() {
        let (registry, _, detector) = harness(Arc::new(FailingTransport));
        registry.insert(MemberRecord::local("b".to_string(), "127.0.0.1:7001".parse().unwrap(), Properties::new()));

        let target = registry.get("b").unwrap().snapshot();
        detector.probe(&target).await;

        // No peers other than "b" itself exist to indirectly probe, so
        // request_probes has zero eligible peers and is a no-op: "b"
        // must not have been promoted to SUSPECT.
        assert_eq!(registry.get("b").unwrap().state, State::Alive);
    }

    #[tokio::test]
    async fn check_failures_promotes_expired_suspect_to_removal() {
        let (registry, reconciler, detector) = harness(Arc::new(FailingTransport));
        reconciler
            .update_state(&ImmutableMember {
                id: "b".to_string(),
                address: "127.0.0.1:7001".parse().unwrap(),
                zone: None,
                rack: None,
                host: None,
                properties: Properties::new(),
                version: None,
                state: State::Alive,
                term: 1,
            })
            .await;
        reconciler
            .update_state(&ImmutableMember {
                id: "b".to_string(),
                address: "127.0.0.1:7001".parse().unwrap(),
                zone: None,
                rack: None,
                host: None,
                properties: Properties::new(),
                version: None,
                state: State::Suspect,
                term: 1,
            })
            .await;

        let mut record = registry.get("b").unwrap();
        record.timestamp -= Duration::from_secs(3600);
        registry.insert(record);

        detector.check_failures().await;

        assert!(registry.get("b").is_none());
    }

    #[tokio::test]
    async fn handle_probe_disputes_suspect_belief_by_advancing_term() {
        let (registry, _, detector) = harness(Arc::new(FailingTransport));
        let local_before = registry.get("local").unwrap().term;

        let incoming = ImmutableMember {
            id: "accuser".to_string(),
            address: "127.0.0.1:7002".parse().unwrap(),
            zone: None,
            rack: None,
            host: None,
            properties: Properties::new(),
            version: None,
            state: State::Suspect,
            term: local_before,
        };

        let reply = detector.handle_probe(&incoming).await;
        assert!(reply.term > local_before);
        assert_eq!(registry.get("local").unwrap().term, reply.term);
    }

    #[tokio::test]
    async fn handle_probe_request_reports_success_on_clean_reply() {
        let (registry, _, detector) = harness(Arc::new(RespondingTransport {
            responder_id: "b".to_string(),
            term: AtomicU64::new(1),
        }));
        registry.insert(MemberRecord::local("b".to_string(), "127.0.0.1:7001".parse().unwrap(), Properties::new()));

        let suspect = registry.get("b").unwrap().snapshot();
        let ok = detector.handle_probe_request(&suspect).await;

        assert!(ok);
    }
}
