//! Node runtime configuration.

use std::path::PathBuf;

use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::proto::Node;

/// Default election timeout minimum, in milliseconds.
pub const DEFAULT_ELECTION_TIMEOUT_MIN: u64 = 150;
/// Default election timeout maximum, in milliseconds.
pub const DEFAULT_ELECTION_TIMEOUT_MAX: u64 = 300;
/// Default heartbeat interval, in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 50;
/// Default deadline for dialing a peer at startup, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 100;
/// Default per-RPC deadline for RequestVote, in milliseconds.
pub const DEFAULT_VOTE_RPC_TIMEOUT: u64 = 4;
/// Default per-RPC deadline for AppendLogs, in milliseconds.
pub const DEFAULT_APPEND_RPC_TIMEOUT: u64 = 12;
/// Default length of the post-election window during which a fresh leader
/// refuses to grant votes, in milliseconds.
pub const DEFAULT_LEADER_GRACE_WINDOW: u64 = 300;
/// Default number of broadcast retries for a client write.
pub const DEFAULT_CLIENT_APPEND_RETRIES: u32 = 3;

/// The runtime configuration of one cluster member.
///
/// Timing values follow the usual Raft inequality
/// `broadcastTime ≪ electionTimeout ≪ MTBF`: the election timeout must be
/// high enough that a healthy leader's heartbeats always arrive within it,
/// and low enough that a real leader crash does not stall the cluster for
/// long. See §5.6 of the Raft paper.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// This node's RPC endpoint (`host:port`), used as its cluster identity.
    pub id: String,
    /// The address clients are redirected to when this node is the leader.
    pub client_addr: String,
    /// Directory holding the durable `term` and `raftlog` files.
    pub data_dir: PathBuf,
    /// RPC endpoints of the other cluster members.
    pub peers: Vec<String>,
    /// The minimum election timeout in milliseconds.
    pub election_timeout_min: u64,
    /// The maximum election timeout in milliseconds.
    pub election_timeout_max: u64,
    /// The interval in milliseconds at which a leader broadcasts
    /// append-entries rounds to keep followers from timing out.
    pub heartbeat_interval: u64,
    /// Deadline in milliseconds for dialing each peer at startup.
    pub connect_timeout: u64,
    /// Per-RPC deadline in milliseconds for outbound RequestVote calls.
    pub vote_rpc_timeout: u64,
    /// Per-RPC deadline in milliseconds for outbound AppendLogs calls.
    pub append_rpc_timeout: u64,
    /// How long in milliseconds a freshly elected leader refuses to grant
    /// votes, suppressing immediate re-elections.
    pub leader_grace_window: u64,
    /// How many times a client write re-broadcasts append-entries before
    /// giving up on reaching a quorum.
    pub client_append_retries: u32,
}

impl Config {
    /// Start the builder process for a new `Config` instance. Call
    /// `validate` when done.
    pub fn build(
        id: impl Into<String>,
        client_addr: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> ConfigBuilder {
        ConfigBuilder {
            id: id.into(),
            client_addr: client_addr.into(),
            data_dir: data_dir.into(),
            peers: Vec::new(),
            election_timeout_min: None,
            election_timeout_max: None,
            heartbeat_interval: None,
            connect_timeout: None,
            vote_rpc_timeout: None,
            append_rpc_timeout: None,
            leader_grace_window: None,
            client_append_retries: None,
        }
    }

    /// Generate a new random election timeout within the configured
    /// min & max.
    pub fn new_rand_election_timeout(&self) -> u64 {
        thread_rng().gen_range(self.election_timeout_min..self.election_timeout_max)
    }

    /// Path of the durable term record.
    pub fn term_file(&self) -> PathBuf {
        self.data_dir.join("term")
    }

    /// Path of the durable log.
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("raftlog")
    }

    /// This node's wire identity.
    pub(crate) fn this_node(&self) -> Node {
        Node {
            id: self.id.clone(),
            client_addr: self.client_addr.clone(),
        }
    }
}

/// A configuration builder to ensure that runtime config is valid before a
/// node is started with it.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    id: String,
    client_addr: String,
    data_dir: PathBuf,
    peers: Vec<String>,
    election_timeout_min: Option<u64>,
    election_timeout_max: Option<u64>,
    heartbeat_interval: Option<u64>,
    connect_timeout: Option<u64>,
    vote_rpc_timeout: Option<u64>,
    append_rpc_timeout: Option<u64>,
    leader_grace_window: Option<u64>,
    client_append_retries: Option<u32>,
}

impl ConfigBuilder {
    /// Add one peer's RPC endpoint to the cluster membership.
    pub fn peer(mut self, addr: impl Into<String>) -> Self {
        self.peers.push(addr.into());
        self
    }

    /// Set the full list of peer RPC endpoints.
    pub fn peers(mut self, addrs: Vec<String>) -> Self {
        self.peers = addrs;
        self
    }

    /// Set the desired value for `election_timeout_min`.
    pub fn election_timeout_min(mut self, val: u64) -> Self {
        self.election_timeout_min = Some(val);
        self
    }

    /// Set the desired value for `election_timeout_max`.
    pub fn election_timeout_max(mut self, val: u64) -> Self {
        self.election_timeout_max = Some(val);
        self
    }

    /// Set the desired value for `heartbeat_interval`.
    pub fn heartbeat_interval(mut self, val: u64) -> Self {
        self.heartbeat_interval = Some(val);
        self
    }

    /// Set the desired value for `connect_timeout`.
    pub fn connect_timeout(mut self, val: u64) -> Self {
        self.connect_timeout = Some(val);
        self
    }

    /// Set the desired value for `vote_rpc_timeout`.
    pub fn vote_rpc_timeout(mut self, val: u64) -> Self {
        self.vote_rpc_timeout = Some(val);
        self
    }

    /// Set the desired value for `append_rpc_timeout`.
    pub fn append_rpc_timeout(mut self, val: u64) -> Self {
        self.append_rpc_timeout = Some(val);
        self
    }

    /// Set the desired value for `leader_grace_window`.
    pub fn leader_grace_window(mut self, val: u64) -> Self {
        self.leader_grace_window = Some(val);
        self
    }

    /// Set the desired value for `client_append_retries`.
    pub fn client_append_retries(mut self, val: u32) -> Self {
        self.client_append_retries = Some(val);
        self
    }

    /// Validate the state of this builder and produce a new `Config`
    /// instance if valid.
    pub fn validate(self) -> Result<Config, ConfigError> {
        let election_timeout_min = self.election_timeout_min.unwrap_or(DEFAULT_ELECTION_TIMEOUT_MIN);
        let election_timeout_max = self.election_timeout_max.unwrap_or(DEFAULT_ELECTION_TIMEOUT_MAX);
        if election_timeout_min >= election_timeout_max {
            return Err(ConfigError::InvalidElectionTimeoutMinMax);
        }
        let heartbeat_interval = self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        if election_timeout_min <= heartbeat_interval {
            return Err(ConfigError::ElectionTimeoutLessThanHeartBeatInterval);
        }
        if self.peers.iter().any(|p| p == &self.id) {
            return Err(ConfigError::PeerListContainsSelf);
        }
        Ok(Config {
            id: self.id,
            client_addr: self.client_addr,
            data_dir: self.data_dir,
            peers: self.peers,
            election_timeout_min,
            election_timeout_max,
            heartbeat_interval,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            vote_rpc_timeout: self.vote_rpc_timeout.unwrap_or(DEFAULT_VOTE_RPC_TIMEOUT),
            append_rpc_timeout: self.append_rpc_timeout.unwrap_or(DEFAULT_APPEND_RPC_TIMEOUT),
            leader_grace_window: self.leader_grace_window.unwrap_or(DEFAULT_LEADER_GRACE_WINDOW),
            client_append_retries: self
                .client_append_retries
                .unwrap_or(DEFAULT_CLIENT_APPEND_RETRIES),
        })
    }
}

//////////////////////////////////////////////////////////////////////////////////////////////////
// Unit Tests ////////////////////////////////////////////////////////////////////////////////////
