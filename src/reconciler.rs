//! Pure decision function merging an incoming member record into the
//! registry, plus local metadata-drift detection.
//!
//! A strictly-newer term always wins and carries a state delta, an
//! equal term only wins when it strictly advances the reachability
//! ordinal, and everything else is rejected.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::MembershipConfig;
use crate::events::{EventBus, MembershipEvent};
use crate::gossip::{GossipEngine, UpdateQueue};
use crate::model::{ImmutableMember, MemberRecord, Properties, State};
use crate::registry::Registry;

pub struct Reconciler {
    registry: Arc<Registry>,
    events: Arc<EventBus>,
    queue: Arc<UpdateQueue>,
    gossip: Arc<GossipEngine>,
    config: MembershipConfig,
    local_properties_snapshot: Mutex<Properties>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<Registry>,
        events: Arc<EventBus>,
        queue: Arc<UpdateQueue>,
        gossip: Arc<GossipEngine>,
        config: MembershipConfig,
        initial_local_properties: Properties,
    ) -> Self {
        Self {
            registry,
            events,
            queue,
            gossip,
            config,
            local_properties_snapshot: Mutex::new(initial_local_properties),
        }
    }

    /// Decides whether `incoming` is accepted into the registry,
    /// mutating it and emitting events when it is. Returns whether the
    /// update was accepted. Must only be called from the scheduler
    /// task.
    pub async fn update_state(&self, incoming: &ImmutableMember) -> bool {
        // Rule 1: self-update rejection.
        if incoming.id == *self.registry.local_id() {
            return false;
        }

        let Some(current) = self.registry.get(&incoming.id) else {
            // Rule 2: first observation, always inserted ALIVE.
            let record = MemberRecord::new_alive_from(incoming, incoming.term);
            let snapshot = record.snapshot();
            self.registry.insert(record);
            self.queue.enqueue(snapshot.clone());
            self.events.post(MembershipEvent::MemberAdded(snapshot)).await;
            return true;
        };

        if incoming.term > current.term {
            self.apply_newer_term(current, incoming).await;
            return true;
        }

        if incoming.term == current.term && incoming.state.ordinal() > current.state.ordinal() {
            self.apply_same_term_advance(current, incoming).await;
            return true;
        }

        debug!(id = %incoming.id, incoming_term = incoming.term, current_term = current.term, "rejected stale or non-advancing update");
        false
    }

    async fn apply_newer_term(&self, current: MemberRecord, incoming: &ImmutableMember) {
        if incoming.version != current.version {
            self.registry.remove(&current.id);
            self.events.post(MembershipEvent::MemberRemoved(current.snapshot())).await;

            let record = MemberRecord::new_alive_from(incoming, incoming.term);
            let snapshot = record.snapshot();
            self.registry.insert(record);
            self.queue.enqueue(snapshot.clone());
            self.events.post(MembershipEvent::MemberAdded(snapshot)).await;
            return;
        }

        let mut record = current;
        record.term = incoming.term;

        if incoming.state == State::Alive && record.state != State::Alive {
            let properties_changed = record.properties != incoming.properties;
            record.set_state(State::Alive);
            let alive_snapshot = record.snapshot();
            self.registry.insert(record.clone());
            self.events.post(MembershipEvent::ReachabilityChanged(alive_snapshot)).await;

            if properties_changed {
                record.properties = incoming.properties.clone();
                let snapshot = record.snapshot();
                self.registry.insert(record.clone());
                self.events.post(MembershipEvent::MetadataChanged(snapshot)).await;
            }

            let snapshot = record.snapshot();
            self.queue.enqueue(snapshot);
        } else if incoming.state == State::Suspect && record.state != State::Suspect {
            let properties_changed = record.properties != incoming.properties;
            if properties_changed {
                record.properties = incoming.properties.clone();
                let snapshot = record.snapshot();
                self.registry.insert(record.clone());
                self.events.post(MembershipEvent::MetadataChanged(snapshot)).await;
            }

            record.set_state(State::Suspect);
            let snapshot = record.snapshot();
            self.registry.insert(record.clone());
            self.events.post(MembershipEvent::ReachabilityChanged(snapshot.clone())).await;

            if self.config.notify_suspect {
                self.gossip.notify_one(snapshot.clone()).await;
            }
            self.queue.enqueue(snapshot);
        } else if incoming.state == State::Dead && record.state != State::Dead {
            if record.state == State::Alive {
                record.set_state(State::Suspect);
                self.events.post(MembershipEvent::ReachabilityChanged(record.snapshot())).await;
            }

            record.set_state(State::Dead);
            let snapshot = record.snapshot();
            self.registry.remove(&record.id);
            self.events.post(MembershipEvent::MemberRemoved(snapshot.clone())).await;
            self.queue.enqueue(snapshot);
        } else {
            // Properties-only change under a term advance.
            if record.properties != incoming.properties {
                record.properties = incoming.properties.clone();
                let snapshot = record.snapshot();
                self.registry.insert(record.clone());
                self.events.post(MembershipEvent::MetadataChanged(snapshot.clone())).await;
                self.queue.enqueue(snapshot);
            } else {
                let snapshot = record.snapshot();
                self.registry.insert(record);
                self.queue.enqueue(snapshot);
            }
        }
    }

    async fn apply_same_term_advance(&self, current: MemberRecord, incoming: &ImmutableMember) {
        let mut record = current;

        match incoming.state {
            State::Suspect => {
                record.set_state(State::Suspect);
                let snapshot = record.snapshot();
                self.registry.insert(record);
                self.events.post(MembershipEvent::ReachabilityChanged(snapshot.clone())).await;

                if self.config.notify_suspect {
                    self.gossip.notify_one(snapshot.clone()).await;
                }
                self.queue.enqueue(snapshot);
            }
            State::Dead => {
                record.set_state(State::Dead);
                let snapshot = record.snapshot();
                self.registry.remove(&record.id);
                self.events.post(MembershipEvent::MemberRemoved(snapshot.clone())).await;
                self.queue.enqueue(snapshot);
            }
            State::Alive => {
                // ALIVE has the lowest ordinal, so it can never strictly
                // exceed a current state's ordinal; the caller's guard
                // (`incoming.state.ordinal() > current.state.ordinal()`)
                // rules this arm out before it's reached.
                unreachable!("ALIVE cannot be a same-term state advance")
            }
        }
    }

    /// Posts `MEMBER_REMOVED` for a record already taken out of the
    /// registry by the caller (the suspicion-timeout sweep removes
    /// first, then reports, rather than going through `update_state`).
    pub async fn emit_removed(&self, removed: ImmutableMember) {
        self.events.post(MembershipEvent::MemberRemoved(removed)).await;
    }

    /// Compares the local record's properties to the shadowed snapshot
    /// taken at the last check; on drift, bumps `term` by one, emits
    /// `METADATA_CHANGED`, and enqueues an update. Invoked on every
    /// gossip tick.
    pub async fn check_metadata(&self) {
        let local_id = self.registry.local_id().clone();
        let Some(mut local) = self.registry.get(&local_id) else {
            return;
        };

        let mut shadow = self.local_properties_snapshot.lock();
        if *shadow == local.properties {
            return;
        }

        *shadow = local.properties.clone();
        drop(shadow);

        local.term += 1;
        let snapshot = local.snapshot();
        self.registry.insert(local);
        self.events.post(MembershipEvent::MetadataChanged(snapshot.clone())).await;
        self.queue.enqueue(snapshot);
    }
}
