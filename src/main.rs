// # SWIM Membership Demo
//
// Minimal entry point wiring the membership core to an in-process
// loopback transport, so the join/leave lifecycle and gossip/probe
// protocol can be exercised without a real network stack. Production
// callers supply their own `RequestResponseTransport`/`UnicastTransport`/
// `DiscoverySource` implementations; this binary exists to demonstrate
// the wiring, not as a deployable transport.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use swim_membership::{
    wire, DiscoveredNode, DiscoverySource, ImmutableMember, LocalMember, MembershipConfig, MembershipService,
    RequestResponseTransport, UnicastTransport,
};
use swim_membership::transport::{TOPIC_GOSSIP, TOPIC_PROBE, TOPIC_PROBE_REQUEST};

struct LoopbackNetwork {
    nodes: DashMap<SocketAddr, Arc<MembershipService>>,
}

impl LoopbackNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self { nodes: DashMap::new() })
    }

    fn register(&self, address: SocketAddr, service: Arc<MembershipService>) {
        self.nodes.insert(address, service);
    }
}

#[async_trait]
impl RequestResponseTransport for LoopbackNetwork {
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
            other => Err(format!("unexpected topic {other}")),
        }
    }
}

#[async_trait]
impl UnicastTransport for LoopbackNetwork {
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

struct EmptyDiscovery;

#[async_trait]
impl DiscoverySource for EmptyDiscovery {
    async fn current_nodes(&self) -> Vec<DiscoveredNode> {
        Vec::new()
    }
}

fn load_config(path: Option<PathBuf>) -> MembershipConfig {
    let Some(path) = path else {
        return MembershipConfig::default();
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                MembershipConfig::default()
            }
        },
        Err(_) => MembershipConfig::default(),
    }
}

fn print_banner() {
    println!("==============================================");
    println!(" SWIM Membership Core — demo");
    println!("==============================================");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    print_banner();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path);
    info!(probe_interval = ?config.probe_interval, gossip_interval = ?config.gossip_interval, "loaded configuration");

    let network = LoopbackNetwork::new();
    let addr_a: SocketAddr = "127.0.0.1:17001".parse().unwrap();
    let addr_b: SocketAddr = "127.0.0.1:17002".parse().unwrap();

    let node_a = Arc::new(MembershipService::new(config.clone(), network.clone(), network.clone()));
    let node_b = Arc::new(MembershipService::new(config, network.clone(), network.clone()));

    network.register(addr_a, node_a.clone());
    network.register(addr_b, node_b.clone());

    node_b
        .join(Vec::new(), Arc::new(EmptyDiscovery), LocalMember::new("node-b", addr_b))
        .await
        .expect("node-b join");

    node_a
        .join(
            vec![DiscoveredNode { id: "node-b".to_string(), address: addr_b }],
            Arc::new(EmptyDiscovery),
            LocalMember::new("node-a", addr_a),
        )
        .await
        .expect("node-a join");

    let mut events = node_a.add_listener().await.expect("event subscription");

    tokio::spawn(async move {
        while let Some(event) = events.receiver.recv().await {
            info!(?event, "membership event");
        }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;

    info!(members = ?node_a.get_members(), "converged membership view at node-a");

    node_a.leave().await.expect("node-a leave");
    node_b.leave().await.expect("node-b leave");
}
