//! Data model: member identity, state lattice, and the mutable/immutable
//! record split described by the membership core.
//!
//! A single mutable [`MemberRecord`] lives in the registry per member; a
//! `snapshot()` of it produces the [`ImmutableMember`] value type that is
//! carried over the wire and inside events. This collapses the source
//! protocol's separate live/immutable record classes into one type with a
//! value-producing method, which is the idiomatic Rust rendering of that
//! split.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Opaque stable identifier for a cluster member.
pub type MemberId = String;

/// Host+port locator used by the transport collaborators.
pub type Address = SocketAddr;

/// Opaque, equality-only identity for a member's software/schema
/// incarnation. A change of `Version` denotes a *different* incarnation
/// of the member, never an ordered upgrade/downgrade — only `PartialEq`
/// is implemented, deliberately no `PartialOrd`/`Ord`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version(pub String);

impl Version {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// Order-insensitive member metadata.
pub type Properties = BTreeMap<String, String>;

/// Reachability state, ordered ALIVE < SUSPECT < DEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum State {
    Alive,
    Suspect,
    Dead,
}

impl State {
    /// Ordinal position in the lattice; higher means "less alive".
    pub const fn ordinal(self) -> u8 {
        match self {
            State::Alive => 0,
            State::Suspect => 1,
            State::Dead => 2,
        }
    }

    pub const fn is_active(self) -> bool {
        !matches!(self, State::Dead)
    }

    pub const fn is_reachable(self) -> bool {
        matches!(self, State::Alive)
    }
}

/// Value copy of a member record: the wire unit and the payload carried
/// inside membership events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableMember {
    pub id: MemberId,
    pub address: Address,
    pub zone: Option<String>,
    pub rack: Option<String>,
    pub host: Option<String>,
    pub properties: Properties,
    pub version: Option<Version>,
    pub state: State,
    pub term: u64,
}

/// Mutable per-peer record held in the registry.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub id: MemberId,
    pub address: Address,
    pub zone: Option<String>,
    pub rack: Option<String>,
    pub host: Option<String>,
    pub version: Option<Version>,
    pub properties: Properties,
    pub state: State,
    pub term: u64,
    pub timestamp: SystemTime,
}

impl MemberRecord {
    /// Creates a fresh ALIVE record from an observed wire record,
    /// ignoring whatever state the wire payload carried (rule 2 of the
    /// reconciler: first observation is always inserted as ALIVE).
    pub fn new_alive_from(incoming: &ImmutableMember, term: u64) -> Self {
        Self {
            id: incoming.id.clone(),
            address: incoming.address,
            zone: incoming.zone.clone(),
            rack: incoming.rack.clone(),
            host: incoming.host.clone(),
            version: incoming.version.clone(),
            properties: incoming.properties.clone(),
            state: State::Alive,
            term,
            timestamp: SystemTime::now(),
        }
    }

    /// Creates the local member's bootstrap record, ALIVE from the
    /// start, term seeded from wall-clock milliseconds per the data
    /// model's invariant for the local member.
    pub fn local(id: MemberId, address: Address, properties: Properties) -> Self {
        let term = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            id,
            address,
            zone: None,
            rack: None,
            host: None,
            version: None,
            properties,
            state: State::Alive,
            term,
            timestamp: SystemTime::now(),
        }
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
        self.timestamp = SystemTime::now();
    }

    /// Value-type snapshot of this record, suitable for the wire or an
    /// event payload.
    pub fn snapshot(&self) -> ImmutableMember {
        ImmutableMember {
            id: self.id.clone(),
            address: self.address,
            zone: self.zone.clone(),
            rack: self.rack.clone(),
            host: self.host.clone(),
            properties: self.properties.clone(),
            version: self.version.clone(),
            state: self.state,
            term: self.term,
        }
    }
}
