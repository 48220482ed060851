//! The consensus core of a Raft-replicated key-value store.
//!
//! This crate owns the replicated state machine of a single cluster member:
//! leader election, log replication, commit-index advancement, durability of
//! the term record and the log, and the RPC-level handlers exchanged between
//! cluster peers. Everything around it — the client-facing API, transport
//! plumbing, process bootstrap — is an external collaborator reached through
//! the seams exported here:
//!
//! - [`RaftNetwork`]: outbound RPCs to peers. Implemented by the application
//!   over whatever transport it uses between cluster members.
//! - [`KeyValueStore`]: the state machine committed entries are applied to.
//! - The reset-signal channel returned by [`RaftNode::new`], consumed by the
//!   election driver in [`runtime`].
//!
//! A node starts as a follower. The [`runtime`] driver races a randomized
//! election timeout against reset signals; on expiry it runs an election,
//! and on a win the node serves client writes ([`RaftNode::set`],
//! [`RaftNode::delete`]) until a higher term forces it back to follower.

pub mod config;
mod core;
pub mod error;
pub mod metrics;
pub mod network;
pub mod proto;
pub mod runtime;
pub mod storage;

pub use async_trait;

pub use crate::config::Config;
pub use crate::config::ConfigBuilder;
pub use crate::core::RaftNode;
pub use crate::core::ResetSignal;
pub use crate::core::Role;
pub use crate::error::ClientWriteError;
pub use crate::error::ConfigError;
pub use crate::error::RaftError;
pub use crate::error::RaftResult;
pub use crate::error::ReplicationError;
pub use crate::metrics::RaftMetrics;
pub use crate::network::RaftNetwork;

/// A trait defining the application's key-value state machine.
///
/// The consensus core applies committed log records here, one at a time and
/// in log-index order. Only entries replicated to a majority of the cluster
/// are ever applied, so implementations do not participate in consensus and
/// both operations are infallible from the core's perspective.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Store `value` under `key`, overwriting any existing value.
    fn set(&self, key: &str, value: &str);

    /// Remove `key` from the store.
    fn delete(&self, key: &str);
}
