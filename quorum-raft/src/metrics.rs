//! Point-in-time observability data for a node.

use serde::{Deserialize, Serialize};

use crate::core::Role;

/// A set of metrics describing the current state of a node.
///
/// Snapshots are taken under the node lock, so the fields within one
/// snapshot are mutually consistent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftMetrics {
    /// The id of this node.
    pub id: String,
    /// The role of this node within the cluster.
    pub role: Role,
    /// The current term.
    pub term: i64,
    /// The index of the last log entry, or -1 for an empty log.
    pub last_log_index: i64,
    /// The highest index known replicated to a majority, or -1.
    pub commit_index: i64,
    /// The highest index applied to the key-value store, or -1.
    pub last_applied: i64,
    /// The id of the node last voted for, which is the leader this node
    /// recognizes while it receives valid appends.
    pub current_leader: Option<String>,
    /// Number of cluster members currently believed reachable,
    /// counting this node.
    pub peers_available: usize,
    /// Total number of cluster members, counting this node.
    pub peers_total: usize,
}
