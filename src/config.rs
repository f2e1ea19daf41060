//! Tunables for the membership core: one struct, a `Default` impl,
//! `serde` derives so it can be loaded from a config file by a caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Period between direct probes.
    pub probe_interval: Duration,

    /// Period between the failure sweep and gossip fanout.
    pub gossip_interval: Duration,

    /// Maximum peers contacted per gossip batch.
    pub gossip_fanout: usize,

    /// Number of peers asked to indirectly probe a suspect.
    pub suspect_probes: usize,

    /// Age in SUSPECT after which a member becomes DEAD.
    pub failure_timeout: Duration,

    /// Gossip a single SUSPECT update immediately on local demotion.
    pub notify_suspect: bool,

    /// Broadcast the local record on dispute-triggered term advances.
    pub broadcast_disputes: bool,

    /// Broadcast a SUSPECT update to every peer once indirect probes
    /// all fail.
    pub broadcast_updates: bool,

    /// Upper bound on the pending gossip update queue. An explicit
    /// decision (the source core leaves this unbounded): once full,
    /// the oldest entry is dropped and a warning is logged.
    pub max_queued_updates: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(1_000),
            gossip_interval: Duration::from_millis(1_000),
            gossip_fanout: 3,
            suspect_probes: 3,
            failure_timeout: Duration::from_secs(10),
            notify_suspect: true,
            broadcast_disputes: true,
            broadcast_updates: true,
            max_queued_updates: 4_096,
        }
    }
}
