//! Crate-wide error type.
//!
//! Most of the SWIM protocol's failure modes are *not* surfaced as
//! `Result` errors — a failed probe falls back to indirect probing, a
//! failed probe-request collapses to `false`, and gossip/broadcast sends
//! are fire-and-forget. `MembershipError` only covers the handful of
//! paths that are genuinely fallible: transport plumbing errors handed
//! back by a caller's transport implementation, and misuse of the
//! service lifecycle.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MembershipError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service already joined")]
    AlreadyJoined,

    #[error("service not joined")]
    NotJoined,

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, MembershipError>;
