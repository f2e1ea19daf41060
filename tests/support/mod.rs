//! In-memory network harness for end-to-end membership tests: routes
//! probe/probe-request/gossip calls between co-located
//! `MembershipService` instances without any real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use swim_membership::transport::{TOPIC_GOSSIP, TOPIC_PROBE, TOPIC_PROBE_REQUEST};
use swim_membership::{DiscoveredNode, DiscoverySource, ImmutableMember, MembershipService, RequestResponseTransport, UnicastTransport};
use swim_membership::wire;

pub struct InMemoryNetwork {
    nodes: DashMap<SocketAddr, Arc<MembershipService>>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { nodes: DashMap::new() })
    }

    pub fn register(&self, address: SocketAddr, service: Arc<MembershipService>) {
        self.nodes.insert(address, service);
    }
}

#[async_trait]
impl RequestResponseTransport for InMemoryNetwork {
    async fn send_and_receive(&self, to: SocketAddr, topic: &str, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        let node = self.nodes.get(&to).map(|n| n.clone()).ok_or_else(|| "no such node".to_string())?;
        match topic {
            TOPIC_PROBE => {
                let incoming: ImmutableMember = wire::decode(&payload)?;
                let reply = node.handle_probe(incoming).await.map_err(|e| e.to_string())?;
                Ok(wire::encode(&reply))
            }
            TOPIC_PROBE_REQUEST => {
                let suspect: ImmutableMember = wire::decode(&payload)?;
                let ok = node.handle_probe_request(suspect).await.map_err(|e| e.to_string())?;
                Ok(wire::encode(&ok))
            }
            other => Err(format!("unexpected request/response topic {other}")),
        }
    }
}

#[async_trait]
impl UnicastTransport for InMemoryNetwork {
    async fn unicast(&self, to: SocketAddr, topic: &str, payload: Vec<u8>) {
        if topic != TOPIC_GOSSIP {
            return;
        }
        let Some(node) = self.nodes.get(&to).map(|n| n.clone()) else { return };
        if let Ok(updates) = wire::decode::<Vec<ImmutableMember>>(&payload) {
            let _ = node.handle_gossip(updates).await;
        }
    }
}

/// Wraps a network, letting a test simulate one node being unable to
/// reach specific peers while every other link stays open.
pub struct BlockableTransport {
    inner: Arc<InMemoryNetwork>,
    blocked: DashSet<SocketAddr>,
}

impl BlockableTransport {
    pub fn new(inner: Arc<InMemoryNetwork>) -> Arc<Self> {
        Arc::new(Self { inner, blocked: DashSet::new() })
    }

    pub fn block(&self, address: SocketAddr) {
        self.blocked.insert(address);
    }

    pub fn unblock(&self, address: SocketAddr) {
        self.blocked.remove(&address);
    }
}

#[async_trait]
impl RequestResponseTransport for BlockableTransport {
    async fn send_and_receive(&self, to: SocketAddr, topic: &str, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        if self.blocked.contains(&to) {
            return Err("link blocked".to_string());
        }
        self.inner.send_and_receive(to, topic, payload).await
    }
}

#[async_trait]
impl UnicastTransport for BlockableTransport {
    async fn unicast(&self, to: SocketAddr, topic: &str, payload: Vec<u8>) {
        if self.blocked.contains(&to) {
            return;
        }
        self.inner.unicast(to, topic, payload).await;
    }
}

pub struct StaticDiscovery {
    nodes: Vec<DiscoveredNode>,
}

impl StaticDiscovery {
    pub fn new(nodes: Vec<DiscoveredNode>) -> Arc<Self> {
        Arc::new(Self { nodes })
    }
}

#[async_trait]
impl DiscoverySource for StaticDiscovery {
    async fn current_nodes(&self) -> Vec<DiscoveredNode> {
        self.nodes.clone()
    }
}

/// Polls `condition` every 10ms until it returns true or `timeout`
/// elapses, returning whether it converged. Avoids flaky fixed sleeps
/// around real (un-paused) timer-driven convergence.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
