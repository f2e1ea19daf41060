//! Single-threaded cooperative scheduler: the one task that owns the
//! probe/gossip timers and every inbound message, so reconciliation,
//! registry mutation, and gossip construction only ever run serialized
//! onto a single executor. Inbound transport callbacks and discovery
//! events are funneled onto this task through an `mpsc` command channel
//! rather than touching the registry directly.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::config::MembershipConfig;
use crate::failure_detector::FailureDetector;
use crate::gossip::{GossipEngine, UpdateQueue};
use crate::model::ImmutableMember;
use crate::reconciler::Reconciler;
use crate::registry::Registry;
use crate::transport::{DiscoveredNode, DiscoveryEvent};

enum Command {
    Probe {
        incoming: ImmutableMember,
        reply: oneshot::Sender<ImmutableMember>,
    },
    ProbeRequest {
        suspect: ImmutableMember,
        reply: oneshot::Sender<bool>,
    },
    Gossip {
        updates: Vec<ImmutableMember>,
    },
    Discovery(DiscoveryEvent),
    ProbeAll,
    Bootstrap(Vec<DiscoveredNode>),
    Shutdown,
}

/// Handle to the running scheduler task. Cloning shares the same
/// underlying channel; dropping every handle without sending
/// `Shutdown` still lets the task exit once the channel closes.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Routes an inbound `MEMBERSHIP_PROBE` request onto the scheduler
    /// task and returns the responder's own record.
    pub async fn handle_probe(&self, incoming: ImmutableMember) -> ImmutableMember {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Probe { incoming, reply: reply_tx }).await.is_err() {
            warn!("scheduler not running, probe dropped");
        }
        reply_rx.await.unwrap_or_else(|_| unreachable_member())
    }

    /// Routes an inbound `MEMBERSHIP_PROBE_REQUEST` onto the scheduler
    /// task and returns whether the nominated member answered.
    pub async fn handle_probe_request(&self, suspect: ImmutableMember) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::ProbeRequest { suspect, reply: reply_tx }).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Routes an inbound `MEMBERSHIP_GOSSIP` batch onto the scheduler
    /// task for reconciliation.
    pub async fn handle_gossip(&self, updates: Vec<ImmutableMember>) {
        let _ = self.commands.send(Command::Gossip { updates }).await;
    }

    pub async fn handle_discovery(&self, event: DiscoveryEvent) {
        let _ = self.commands.send(Command::Discovery(event)).await;
    }

    pub async fn probe_all(&self) {
        let _ = self.commands.send(Command::ProbeAll).await;
    }

    /// Routes join-time bootstrap peers through a direct probe each,
    /// exactly like the discovery `JOIN` arm, so first observation goes
    /// through the reconciler's rule 2 and fires `MEMBER_ADDED` rather
    /// than being pre-inserted into the registry.
    pub async fn bootstrap(&self, nodes: Vec<DiscoveredNode>) {
        let _ = self.commands.send(Command::Bootstrap(nodes)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

fn unreachable_member() -> ImmutableMember {
    ImmutableMember {
        id: String::new(),
        address: "0.0.0.0:0".parse().unwrap(),
        zone: None,
        rack: None,
        host: None,
        properties: Default::default(),
        version: None,
        state: crate::model::State::Dead,
        term: 0,
    }
}

pub fn spawn(
    registry: Arc<Registry>,
    reconciler: Arc<Reconciler>,
    failure_detector: Arc<FailureDetector>,
    gossip: Arc<GossipEngine>,
    queue: Arc<UpdateQueue>,
    config: MembershipConfig,
) -> SchedulerHandle {
    let (tx, mut rx) = mpsc::channel::<Command>(256);

    tokio::spawn(async move {
        let mut probe_timer = tokio::time::interval(config.probe_interval);
        let mut gossip_timer = tokio::time::interval(config.gossip_interval);
        probe_timer.tick().await;
        gossip_timer.tick().await;

        loop {
            tokio::select! {
                _ = probe_timer.tick() => {
                    failure_detector.probe_one().await;
                }
                _ = gossip_timer.tick() => {
                    failure_detector.check_failures().await;
                    reconciler.check_metadata().await;
                    let updates = queue.drain();
                    if !updates.is_empty() {
                        gossip.gossip(updates).await;
                    }
                }
                command = rx.recv() => {
                    match command {
                        Some(Command::Probe { incoming, reply }) => {
                            let response = failure_detector.handle_probe(&incoming).await;
                            let _ = reply.send(response);
                        }
                        Some(Command::ProbeRequest { suspect, reply }) => {
                            let ok = failure_detector.handle_probe_request(&suspect).await;
                            let _ = reply.send(ok);
                        }
                        Some(Command::Gossip { updates }) => {
                            for update in updates {
                                reconciler.update_state(&update).await;
                            }
                        }
                        Some(Command::Discovery(DiscoveryEvent::Join(node))) => {
                            if !registry.contains(&node.id) {
                                failure_detector.probe(&node.as_stub_member()).await;
                            }
                        }
                        Some(Command::Discovery(DiscoveryEvent::Leave(node))) => {
                            if let Some(record) = registry.get(&node.id) {
                                if !record.state.is_active() {
                                    registry.remove(&node.id);
                                }
                            }
                        }
                        Some(Command::ProbeAll) => {
                            failure_detector.probe_all().await;
                        }
                        Some(Command::Bootstrap(nodes)) => {
                            for node in nodes {
                                if node.id != *registry.local_id() && !registry.contains(&node.id) {
                                    failure_detector.probe(&node.as_stub_member()).await;
                                }
                            }
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
            }
        }
    });

    SchedulerHandle { commands: tx }
}
