//! Decentralized cluster-membership core implementing SWIM: direct and
//! indirect failure detection, gossip-piggybacked dissemination, and a
//! (term, reachability-state) lattice merge that gives conflict-free
//! convergence without a coordinator.
//!
//! The crate consumes transport and discovery collaborators through
//! the traits in [`transport`]; it does not ship a production
//! transport of its own. [`service::MembershipService`] is the entry
//! point.

pub mod config;
pub mod error;
pub mod events;
pub mod failure_detector;
pub mod gossip;
pub mod model;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod transport;
pub mod wire;

pub use config::MembershipConfig;
pub use error::{MembershipError, Result};
pub use events::{MembershipEvent, Subscription};
pub use model::{Address, ImmutableMember, MemberId, Properties, State, Version};
pub use service::{LocalMember, MembershipService};
pub use transport::{DiscoveredNode, DiscoveryEvent, DiscoverySource, RequestResponseTransport, UnicastTransport};
