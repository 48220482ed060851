//! Wire types exchanged between cluster peers and persisted to disk.
//!
//! These structs are hand-maintained rather than generated from a `.proto`
//! file, but their field numbers are part of the wire contract and must not
//! change: peers on the old and new build of this crate must be able to
//! decode each other's frames, and a restarted node must be able to decode
//! the `term` and `raftlog` files it wrote before the restart.

/// The identity of one cluster member.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Node {
    /// The member's RPC endpoint (`host:port`). This is the canonical
    /// comparison key for peer identity.
    #[prost(string, tag = "1")]
    pub id: String,
    /// The address clients should be redirected to for writes.
    #[prost(string, tag = "2")]
    pub client_addr: String,
}

/// An RPC invoked by candidates to gather votes (§5.2).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoteRequest {
    /// The candidate's current term.
    #[prost(int64, tag = "1")]
    pub term: i64,
    /// The candidate's identity.
    #[prost(message, optional, tag = "2")]
    pub candidate: Option<Node>,
    /// The index of the candidate's last log entry, or -1 for an empty log.
    #[prost(int64, tag = "3")]
    pub last_log_index: i64,
    /// The term of the candidate's last log entry, or 0 for an empty log.
    #[prost(int64, tag = "4")]
    pub last_log_term: i64,
}

/// The response to a `VoteRequest`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoteReply {
    /// The current term of the responding node, for the candidate to update
    /// itself.
    #[prost(int64, tag = "1")]
    pub term: i64,
    /// Will be true if the candidate received a vote from the responder.
    #[prost(bool, tag = "2")]
    pub vote_granted: bool,
    /// The identity of the responding node.
    #[prost(message, optional, tag = "3")]
    pub node: Option<Node>,
}

/// An RPC invoked by the leader to replicate log entries (§5.3); also used
/// as a heartbeat (§5.2).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppendRequest {
    /// The leader's current term.
    #[prost(int64, tag = "1")]
    pub term: i64,
    /// The leader's identity. Useful in redirecting clients.
    #[prost(message, optional, tag = "2")]
    pub leader: Option<Node>,
    /// The index of the log entry immediately preceding the new entries,
    /// or -1 when shipping from the start of the log.
    #[prost(int64, tag = "3")]
    pub prev_log_index: i64,
    /// The term of the `prev_log_index` entry, or 0 when it is -1.
    #[prost(int64, tag = "4")]
    pub prev_log_term: i64,
    /// The leader's commit index.
    #[prost(int64, tag = "5")]
    pub leader_commit: i64,
    /// The new log entries to store. Empty for heartbeats.
    #[prost(message, repeated, tag = "6")]
    pub entries: Vec<LogRecord>,
}

/// The response to an `AppendRequest`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppendReply {
    /// The responding node's current term, for the leader to update itself.
    #[prost(int64, tag = "1")]
    pub term: i64,
    /// Will be true if the follower contained an entry matching
    /// `prev_log_index` and `prev_log_term` and accepted the payload.
    #[prost(bool, tag = "2")]
    pub success: bool,
}

/// One replicated record: a write or a deletion against the key-value store.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogRecord {
    /// The term in which the record was created.
    #[prost(int64, tag = "1")]
    pub term: i64,
    /// Whether this record sets or deletes a key.
    #[prost(enumeration = "Action", tag = "2")]
    pub action: i32,
    #[prost(string, tag = "3")]
    pub key: String,
    /// Ignored for `DEL` records.
    #[prost(string, tag = "4")]
    pub value: String,
}

/// The full replicated log, as persisted in the `raftlog` file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogStore {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<LogRecord>,
}

/// The persistent identity of a node's current term and the peer it voted
/// for in that term, as persisted in the `term` file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TermRecord {
    #[prost(int64, tag = "1")]
    pub term: i64,
    #[prost(message, optional, tag = "2")]
    pub voted_for: Option<Node>,
}

/// The kinds of operations a `LogRecord` can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Action {
    Set = 0,
    Del = 1,
}

impl LogRecord {
    /// Build a SET record for the given term.
    pub fn set(term: i64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            term,
            action: Action::Set as i32,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a DEL record for the given term. The value field is unused.
    pub fn del(term: i64, key: impl Into<String>) -> Self {
        Self {
            term,
            action: Action::Del as i32,
            key: key.into(),
            value: String::new(),
        }
    }
}
