//! Public API surface: `join`/`leave` lifecycle, member queries, and
//! event subscriptions. Wires the registry, reconciler, failure
//! detector, gossip engine, event bus, and scheduler together and
//! exposes the inbound-message entry points a caller's transport
//! integration dispatches into.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::MembershipConfig;
use crate::error::{MembershipError, Result};
use crate::events::{EventBus, MembershipEvent, Subscription};
use crate::failure_detector::FailureDetector;
use crate::gossip::{GossipEngine, UpdateQueue};
use crate::model::{Address, ImmutableMember, MemberId, MemberRecord, Properties};
use crate::reconciler::Reconciler;
use crate::registry::Registry;
use crate::scheduler::{self, SchedulerHandle};
use crate::transport::{DiscoveryEvent, DiscoverySource, RequestResponseTransport, UnicastTransport};

/// Descriptor used to create the local member's record at `join`.
pub struct LocalMember {
    pub id: MemberId,
    pub address: Address,
    pub zone: Option<String>,
    pub rack: Option<String>,
    pub host: Option<String>,
    pub properties: Properties,
}

impl LocalMember {
    pub fn new(id: impl Into<MemberId>, address: Address) -> Self {
        Self {
            id: id.into(),
            address,
            zone: None,
            rack: None,
            host: None,
            properties: Properties::new(),
        }
    }
}

struct Running {
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    scheduler: SchedulerHandle,
}

enum State {
    NotJoined,
    Joined(Running),
    Left(Arc<Registry>),
}

pub struct MembershipService {
    config: MembershipConfig,
    request_response: Arc<dyn RequestResponseTransport>,
    unicast: Arc<dyn UnicastTransport>,
    state: Mutex<State>,
    next_subscription_id: AtomicU64,
}

impl MembershipService {
    pub fn new(
        config: MembershipConfig,
        request_response: Arc<dyn RequestResponseTransport>,
        unicast: Arc<dyn UnicastTransport>,
    ) -> Self {
        Self {
            config,
            request_response,
            unicast,
            state: Mutex::new(State::NotJoined),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Idempotent: succeeds at most once. Creates the local record,
    /// wires the core's components together, starts the gossip/probe
    /// timers, and kicks an immediate probe of every bootstrap peer.
    pub async fn join(
        &self,
        bootstrap: Vec<crate::transport::DiscoveredNode>,
        discovery: Arc<dyn DiscoverySource>,
        local: LocalMember,
    ) -> Result<()> {
        {
            let guard = self.state.lock();
            if !matches!(&*guard, State::NotJoined) {
                return Err(MembershipError::AlreadyJoined);
            }
        }

        let registry = Arc::new(Registry::new(local.id.clone()));
        let mut local_record = MemberRecord::local(local.id.clone(), local.address, local.properties.clone());
        local_record.zone = local.zone;
        local_record.rack = local.rack;
        local_record.host = local.host;
        registry.insert(local_record);

        let events = Arc::new(EventBus::spawn());
        let queue = Arc::new(UpdateQueue::new(self.config.max_queued_updates));
        let gossip = Arc::new(GossipEngine::new(registry.clone(), self.unicast.clone(), self.config.clone()));
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            events.clone(),
            queue.clone(),
            gossip.clone(),
            self.config.clone(),
            local.properties,
        ));
        let failure_detector = Arc::new(FailureDetector::new(
            registry.clone(),
            reconciler.clone(),
            discovery,
            self.request_response.clone(),
            gossip.clone(),
            self.config.clone(),
        ));

        let scheduler = scheduler::spawn(
            registry.clone(),
            reconciler,
            failure_detector,
            gossip,
            queue,
            self.config.clone(),
        );
        scheduler.probe_all().await;
        scheduler.bootstrap(bootstrap).await;

        let mut guard = self.state.lock();
        *guard = State::Joined(Running { registry, events, scheduler });
        Ok(())
    }

    /// Idempotent: the first call tears down the scheduler and event
    /// bus and clears the registry; subsequent calls are no-ops.
    pub async fn leave(&self) -> Result<()> {
        let running = {
            let mut guard = self.state.lock();
            match std::mem::replace(&mut *guard, State::NotJoined) {
                State::Joined(running) => Some(running),
                other @ State::Left(_) => {
                    *guard = other;
                    None
                }
                State::NotJoined => {
                    *guard = State::NotJoined;
                    None
                }
            }
        };

        let Some(running) = running else {
            return Ok(());
        };

        running.scheduler.shutdown().await;

        if let Some(mut local) = running.registry.get(running.registry.local_id()) {
            local.set_state(crate::model::State::Dead);
            running.registry.insert(local);
        }
        for id in running.registry.snapshot().iter().map(|r| r.id.clone()) {
            running.registry.remove(&id);
        }

        let mut guard = self.state.lock();
        *guard = State::Left(running.registry);
        Ok(())
    }

    pub fn get_members(&self) -> Vec<ImmutableMember> {
        match &*self.state.lock() {
            State::Joined(running) => running.registry.snapshot().iter().map(|r| r.snapshot()).collect(),
            State::Left(registry) => registry.snapshot().iter().map(|r| r.snapshot()).collect(),
            State::NotJoined => Vec::new(),
        }
    }

    pub fn get_member(&self, id: &str) -> Option<ImmutableMember> {
        match &*self.state.lock() {
            State::Joined(running) => running.registry.get(id).map(|r| r.snapshot()),
            State::Left(registry) => registry.get(id).map(|r| r.snapshot()),
            State::NotJoined => None,
        }
    }

    /// Subscribes to membership events. Returns `None` before `join`
    /// or after `leave`, when no event bus is running.
    pub async fn add_listener(&self) -> Option<Subscription> {
        let events = match &*self.state.lock() {
            State::Joined(running) => running.events.clone(),
            _ => return None,
        };
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let receiver = events.subscribe(id).await;
        Some(Subscription { id, receiver })
    }

    pub async fn remove_listener(&self, id: u64) {
        let events = match &*self.state.lock() {
            State::Joined(running) => Some(running.events.clone()),
            _ => None,
        };
        if let Some(events) = events {
            events.unsubscribe(id).await;
        }
    }

    /// Entry point for an inbound `atomix-membership-probe` request.
    pub async fn handle_probe(&self, incoming: ImmutableMember) -> Result<ImmutableMember> {
        let scheduler = self.scheduler_handle()?;
        Ok(scheduler.handle_probe(incoming).await)
    }

    /// Entry point for an inbound `atomix-membership-probe-request`.
    pub async fn handle_probe_request(&self, suspect: ImmutableMember) -> Result<bool> {
        let scheduler = self.scheduler_handle()?;
        Ok(scheduler.handle_probe_request(suspect).await)
    }

    /// Entry point for an inbound `atomix-membership-gossip` batch.
    pub async fn handle_gossip(&self, updates: Vec<ImmutableMember>) -> Result<()> {
        let scheduler = self.scheduler_handle()?;
        scheduler.handle_gossip(updates).await;
        Ok(())
    }

    /// Entry point for the discovery source's `JOIN`/`LEAVE` callbacks.
    pub async fn handle_discovery_event(&self, event: DiscoveryEvent) -> Result<()> {
        let scheduler = self.scheduler_handle()?;
        scheduler.handle_discovery(event).await;
        Ok(())
    }

    fn scheduler_handle(&self) -> Result<SchedulerHandle> {
        match &*self.state.lock() {
            State::Joined(running) => Ok(running.scheduler.clone()),
            _ => Err(MembershipError::NotJoined),
        }
    }
}
