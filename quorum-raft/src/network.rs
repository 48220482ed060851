//! The Raft network interface.

use anyhow::Result;
use async_trait::async_trait;

use crate::proto::{AppendReply, AppendRequest, VoteReply, VoteRequest};

/// A trait defining the interface for a Raft network between cluster
/// members.
///
/// Implementations own the actual transport. The consensus core addresses
/// peers by their RPC endpoint (`host:port`) and applies its own per-RPC
/// deadlines around these calls, so implementations do not need to enforce
/// timeouts of their own.
#[async_trait]
pub trait RaftNetwork: Send + Sync + 'static {
    /// Open a channel to the target peer.
    ///
    /// Called once per configured peer when the node starts. A failure
    /// marks the peer unavailable but does not remove it from the cluster
    /// membership.
    async fn connect(&self, target: &str) -> Result<()>;

    /// Send a RequestVote RPC to the target peer (§5.2).
    async fn vote(&self, target: &str, rpc: VoteRequest) -> Result<VoteReply>;

    /// Send an AppendLogs RPC to the target peer (§5.3).
    async fn append_logs(&self, target: &str, rpc: AppendRequest) -> Result<AppendReply>;

    /// Close the channel to the target peer. Called during node teardown.
    async fn disconnect(&self, target: &str);
}
