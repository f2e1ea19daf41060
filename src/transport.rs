//! Trait boundary for the external collaborators consumed, not
//! implemented, by the core: the request/response service, the unicast
//! (fire-and-forget) service, and the node-discovery source. One small
//! async trait per collaborator rather than one monolithic transport
//! trait.

use async_trait::async_trait;

use crate::model::{Address, ImmutableMember, Properties, State};

/// Topic used for the direct-probe request/response exchange.
pub const TOPIC_PROBE: &str = "atomix-membership-probe";
/// Topic used for the indirect-probe-request request/response exchange.
pub const TOPIC_PROBE_REQUEST: &str = "atomix-membership-probe-request";
/// Topic used for unicast gossip fanout.
pub const TOPIC_GOSSIP: &str = "atomix-membership-gossip";

/// A request/response collaborator: send a payload to `to` on `topic`
/// and await a reply payload. Errors here are never surfaced to the
/// caller of the membership API — the failure detector treats them as
/// "probe failed" and falls back accordingly.
#[async_trait]
pub trait RequestResponseTransport: Send + Sync {
    async fn send_and_receive(
        &self,
        to: Address,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, String>;
}

/// A fire-and-forget unicast collaborator.
#[async_trait]
pub trait UnicastTransport: Send + Sync {
    async fn unicast(&self, to: Address, topic: &str, payload: Vec<u8>);
}

/// A node discovered by the seeding service, prior to any SWIM probe
/// having confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub id: String,
    pub address: Address,
}

impl DiscoveredNode {
    /// A not-yet-probed placeholder record: term 0, ALIVE, no version.
    /// Used as the probe target for a node the discovery source
    /// reports but the registry has not yet observed.
    pub fn as_stub_member(&self) -> ImmutableMember {
        ImmutableMember {
            id: self.id.clone(),
            address: self.address,
            zone: None,
            rack: None,
            host: None,
            properties: Properties::new(),
            version: None,
            state: State::Alive,
            term: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Join(DiscoveredNode),
    Leave(DiscoveredNode),
}

/// A node-discovery collaborator seeding peer addresses.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn current_nodes(&self) -> Vec<DiscoveredNode>;
}
