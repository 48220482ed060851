//! The node state machine: one member of the cluster, with all state
//! needed to run the consensus algorithm.

mod append_entries;
mod client;
mod election;
mod peers;
mod replication;
mod vote;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::core::peers::PeerRegistry;
use crate::error::{RaftResult, StorageError};
use crate::metrics::RaftMetrics;
use crate::proto::{Action, LogRecord, LogStore, Node, TermRecord};
use crate::storage::StableStore;
use crate::{KeyValueStore, RaftNetwork};

/// The role of a node within the cluster.
///
/// Candidate is not materialized: a node running an election keeps handling
/// incoming messages exactly as a follower would until the election is won,
/// so only two roles exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// A read-only member which votes and accepts appends.
    Follower,
    /// The member serving client writes and driving replication.
    Leader,
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }
}

/// The receiving half of the election-timer reset channel.
///
/// Hand this to the election driver (see [`crate::runtime`]); the node
/// sends on the other half every time it observes a valid leader or grants
/// a vote. Sends are fire-and-forget: if the driver is mid-cycle a signal
/// may be dropped, which is fine because one pending signal is enough to
/// restart the timer.
pub type ResetSignal = mpsc::Receiver<()>;

/// The volatile and persistent state of this peer, guarded by the node
/// mutex.
pub(crate) struct NodeState {
    pub role: Role,
    /// Monotonically non-decreasing; durable before any acknowledgement.
    pub term: i64,
    /// The peer voted for in `term`, durable together with it.
    pub voted_for: Option<Node>,
    /// The replicated log; durable before a successful append reply.
    pub log: Vec<LogRecord>,
    /// Highest index known replicated on a majority, -1 initially.
    pub commit_index: i64,
    /// Highest index applied to the key-value store, -1 initially.
    /// Always <= `commit_index`.
    pub last_applied: i64,
    /// Cleared while a freshly elected leader sits in its grace window.
    pub allow_vote: bool,
}

impl NodeState {
    /// Index of the last log entry, or -1 for an empty log.
    pub fn last_log_index(&self) -> i64 {
        self.log.len() as i64 - 1
    }

    /// Term of the last log entry, or 0 for an empty log.
    pub fn last_log_term(&self) -> i64 {
        self.log.last().map_or(0, |record| record.term)
    }
}

/// One member of a Raft cluster.
///
/// All state transitions run under a single node mutex; client writes hold
/// it for their full append+replicate+commit span, which serializes writes
/// on the leader. Per-peer replication bookkeeping lives in a separate
/// registry with its own short-lived lock.
///
/// Lock order: node state first, peer registry second.
pub struct RaftNode<N: RaftNetwork, S: KeyValueStore> {
    /// This node's wire identity.
    id: Node,
    pub(crate) config: Arc<Config>,
    pub(crate) network: Arc<N>,
    /// The external key-value store committed records are applied to.
    store: Arc<S>,
    stable: StableStore,
    pub(crate) state: Mutex<NodeState>,
    pub(crate) peers: PeerRegistry,
    reset_tx: mpsc::Sender<()>,
}

impl<N: RaftNetwork, S: KeyValueStore> RaftNode<N, S> {
    /// Create a node by loading its persistent state from the data
    /// directory and dialing each configured peer.
    ///
    /// The node comes up as a follower with nothing applied; committed
    /// entries are re-applied to the store as commits propagate. The
    /// returned [`ResetSignal`] belongs to the election driver.
    pub async fn new(
        config: Arc<Config>,
        network: Arc<N>,
        store: Arc<S>,
    ) -> RaftResult<(Self, ResetSignal)> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|err| StorageError::io(config.data_dir.clone(), err))?;

        let stable = StableStore::new(&config);
        let term_record = stable.load_term().await?;
        let log_store = stable.load_log().await?;
        tracing::info!(
            term = term_record.term,
            vote = ?term_record.voted_for.as_ref().map(|n| &n.id),
            n_logs = log_store.entries.len(),
            "loaded persistent state"
        );

        let dial_timeout = Duration::from_millis(config.connect_timeout);
        let peers = PeerRegistry::connect(network.as_ref(), &config.peers, dial_timeout).await;

        let (reset_tx, reset_rx) = mpsc::channel(1);
        let node = Self {
            id: config.this_node(),
            config,
            network,
            store,
            stable,
            state: Mutex::new(NodeState {
                role: Role::Follower,
                term: term_record.term,
                voted_for: term_record.voted_for,
                log: log_store.entries,
                commit_index: -1,
                last_applied: -1,
                allow_vote: true,
            }),
            peers,
            reset_tx,
        };
        Ok((node, reset_rx))
    }

    /// The node's runtime config.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// This node's wire identity.
    pub(crate) fn this_node(&self) -> &Node {
        &self.id
    }

    /// The address writes should be redirected to: the peer this node
    /// voted for in the current term, when one is recorded.
    pub async fn redirect_leader(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.voted_for.as_ref().map(|node| node.client_addr.clone())
    }

    /// Restore (or withdraw) this node's willingness to grant votes.
    ///
    /// The election driver calls this with `true` once the post-election
    /// grace window has passed.
    pub async fn set_allow_vote(&self, allow: bool) {
        let mut state = self.state.lock().await;
        state.allow_vote = allow;
    }

    /// A point-in-time snapshot of this node's state.
    pub async fn metrics(&self) -> RaftMetrics {
        let state = self.state.lock().await;
        let (peers_available, peers_total) = self.peers.availability();
        RaftMetrics {
            id: self.id.id.clone(),
            role: state.role,
            term: state.term,
            last_log_index: state.last_log_index(),
            commit_index: state.commit_index,
            last_applied: state.last_applied,
            current_leader: state.voted_for.as_ref().map(|node| node.id.clone()),
            peers_available,
            peers_total,
        }
    }

    /// Tear down the node's peer channels.
    pub async fn shutdown(&self) {
        for target in self.peers.ids() {
            self.network.disconnect(&target).await;
        }
    }

    /// The number of nodes that constitutes a quorum, counting this node.
    pub(crate) fn majority(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    /// Force the node into follower role and nudge the election driver to
    /// restart its timer. The send is fire-and-forget; a dropped signal
    /// means one is already pending.
    pub(crate) fn reset_election_timer(&self, state: &mut NodeState) {
        state.role = Role::Follower;
        let _ = self.reset_tx.try_send(());
    }

    /// Record a term and vote in non-volatile state. The memory image is
    /// only updated once the record is durable.
    pub(crate) async fn set_term(
        &self,
        state: &mut NodeState,
        term: i64,
        voted_for: Option<Node>,
    ) -> Result<(), StorageError> {
        let record = TermRecord {
            term,
            voted_for: voted_for.clone(),
        };
        self.stable.save_term(&record).await?;
        tracing::debug!(term, vote = ?voted_for.as_ref().map(|n| &n.id), "term record updated");
        state.term = term;
        state.voted_for = voted_for;
        Ok(())
    }

    /// Record new log contents in non-volatile state, returning the index
    /// of the last record. The memory image is only updated once the log
    /// is durable.
    pub(crate) async fn set_log(
        &self,
        state: &mut NodeState,
        entries: Vec<LogRecord>,
    ) -> Result<i64, StorageError> {
        let store = LogStore { entries };
        self.stable.save_log(&store).await?;
        let idx = store.entries.len() as i64 - 1;
        state.log = store.entries;
        Ok(idx)
    }

    /// Apply every committed-but-unapplied record to the key-value store,
    /// one at a time and in log-index order.
    pub(crate) fn apply_committed(&self, state: &mut NodeState) {
        while state.last_applied < state.commit_index {
            state.last_applied += 1;
            let record = &state.log[state.last_applied as usize];
            match record.action() {
                Action::Set => {
                    tracing::trace!(index = state.last_applied, key = %record.key, value = %record.value, "store set");
                    self.store.set(&record.key, &record.value);
                }
                Action::Del => {
                    tracing::trace!(index = state.last_applied, key = %record.key, "store delete");
                    self.store.delete(&record.key);
                }
            }
        }
    }
}
