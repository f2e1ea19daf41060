//! In-memory map of `MemberId -> MemberRecord` plus a randomized peer
//! list used for probing and gossip. Mutated only from the scheduler
//! task; reads are lock-free against the concurrent map so public query
//! methods on `MembershipService` can be called from any task.

use dashmap::DashMap;
use rand::seq::SliceRandom;

use crate::model::{MemberId, MemberRecord};

pub struct Registry {
    local_id: MemberId,
    members: DashMap<MemberId, MemberRecord>,
}

impl Registry {
    pub fn new(local_id: MemberId) -> Self {
        Self {
            local_id,
            members: DashMap::new(),
        }
    }

    pub fn local_id(&self) -> &MemberId {
        &self.local_id
    }

    pub fn get(&self, id: &str) -> Option<MemberRecord> {
        self.members.get(id).map(|entry| entry.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    /// Immutable copy of every record currently tracked, local member
    /// included.
    pub fn snapshot(&self) -> Vec<MemberRecord> {
        self.members.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn insert(&self, record: MemberRecord) {
        self.members.insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &str) -> Option<MemberRecord> {
        self.members.remove(id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A private shuffle of non-local members, used by probing and
    /// gossip to spread load evenly across peers.
    pub fn shuffled_peers(&self) -> Vec<MemberId> {
        let mut peers: Vec<MemberId> = self
            .members
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| id != &self.local_id)
            .collect();
        peers.shuffle(&mut rand::rng());
        peers
    }
}
