//! Error types exposed by this crate.

use std::path::PathBuf;
use std::time::Duration;

/// A result type where the error variant is always a `RaftError`.
pub type RaftResult<T> = std::result::Result<T, RaftError>;

/// Error variants related to the internals of Raft.
///
/// The RPC handlers only fail when the durable store does: a term or log
/// update that cannot be made durable must not be acknowledged, so the
/// handler surfaces the storage error instead of a reply. Callers should
/// treat this as grounds for shutting the node down.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RaftError {
    /// An error which has come from the durable store.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An error raised while reading or writing the durable `term` and
/// `raftlog` files.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error variants related to an append-entries broadcast.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReplicationError {
    /// The broadcast was invoked after this node stepped down.
    #[error("cannot send append-entries when no longer the leader")]
    NotLeader,

    /// The broadcast was invoked for a term that has already passed.
    #[error("append-entries requested for expired term {requested}, current term is {current}")]
    ExpiredTerm { requested: i64, current: i64 },

    /// The round (including retries) did not reach a majority of nodes.
    #[error("appended to {appended} of the {needed} nodes needed for quorum")]
    QuorumNotReached { appended: usize, needed: usize },

    /// Log-match back-off walked to the start of the log without finding a
    /// point of agreement with the target peer.
    #[error("log match back-off reached the start of the log for {target}")]
    RangeExhausted { target: String },

    /// The target peer did not reply within the per-RPC deadline.
    #[error("timeout after {timeout:?} appending to {target}")]
    Timeout { target: String, timeout: Duration },

    /// A transport-level error from the network layer.
    #[error("network error appending to {target}: {source}")]
    Network {
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Error variants related to a client write request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientWriteError {
    /// The write arrived at a node that is not the leader; it must be
    /// forwarded to the address carried here, when one is known.
    #[error("this node is not the Raft leader")]
    ForwardToLeader(Option<String>),

    /// Replication of the new record failed.
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// The record could not be made durable.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A quorum acknowledged the append but the commit index did not reach
    /// the new record.
    #[error("record at index {index} failed to commit, commit index is {commit_index}")]
    CommitFailed { index: i64, commit_index: i64 },
}

/// Error variants related to configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The given values for election timeout min & max are invalid: max
    /// must be greater than min.
    #[error("given values for election timeout min & max are invalid: max must be greater than min")]
    InvalidElectionTimeoutMinMax,

    /// An election timeout at or below the heartbeat interval would force
    /// elections under a healthy leader.
    #[error("election_timeout_min value must be > heartbeat_interval")]
    ElectionTimeoutLessThanHeartBeatInterval,

    /// The peer list must only name the other cluster members.
    #[error("the peer list must not contain this node's own id")]
    PeerListContainsSelf,
}
