//! The peer registry: cluster membership and per-peer replication
//! bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::timeout;

use crate::RaftNetwork;

/// Replication bookkeeping for one cluster peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PeerProgress {
    /// The next log index to ship to this peer.
    pub next_index: i64,
    /// The highest log index known replicated on this peer, or -1 when no
    /// replication has been confirmed yet.
    pub match_index: i64,
    /// Whether the last interaction with this peer succeeded.
    pub available: bool,
}

/// The mapping from peer identity to its replication state.
///
/// Membership is fixed at construction from the configured peer list; the
/// progress fields are mutated throughout replication. The inner mutex is
/// only ever held for short synchronous sections, never across an await.
pub(crate) struct PeerRegistry {
    peers: Mutex<HashMap<String, PeerProgress>>,
}

impl PeerRegistry {
    /// Dial every configured peer and register it.
    ///
    /// A peer that cannot be dialed within the deadline is still a cluster
    /// member; it just starts out marked unavailable.
    pub async fn connect<N: RaftNetwork>(
        network: &N,
        addrs: &[String],
        dial_timeout: Duration,
    ) -> Self {
        let mut peers = HashMap::with_capacity(addrs.len());
        for addr in addrs {
            let available = match timeout(dial_timeout, network.connect(addr)).await {
                Ok(Ok(())) => true,
                Ok(Err(err)) => {
                    tracing::error!(peer = %addr, error = %err, "failed to connect to peer");
                    false
                }
                Err(_) => {
                    tracing::error!(peer = %addr, "timed out connecting to peer");
                    false
                }
            };
            tracing::info!(peer = %addr, available, "added peer to known nodes");
            peers.insert(
                addr.clone(),
                PeerProgress {
                    next_index: 0,
                    match_index: -1,
                    available,
                },
            );
        }
        Self {
            peers: Mutex::new(peers),
        }
    }

    /// Whether `id` is a known cluster member.
    pub fn contains(&self, id: &str) -> bool {
        self.peers.lock().unwrap().contains_key(id)
    }

    /// The ids of all registered peers.
    pub fn ids(&self) -> Vec<String> {
        self.peers.lock().unwrap().keys().cloned().collect()
    }

    /// The number of registered peers (not counting this node).
    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Nodes believed currently reachable and total cluster size, both
    /// counting this node.
    pub fn availability(&self) -> (usize, usize) {
        let peers = self.peers.lock().unwrap();
        let available = 1 + peers.values().filter(|p| p.available).count();
        (available, 1 + peers.len())
    }

    /// Reset every peer's progress for a fresh term of leadership:
    /// nothing confirmed, next entry to ship is the end of the log.
    pub fn reset_progress(&self, next_index: i64) {
        let mut peers = self.peers.lock().unwrap();
        for progress in peers.values_mut() {
            progress.match_index = -1;
            progress.next_index = next_index;
        }
    }

    /// The confirmed replication index for `id`, or -1 for an unknown
    /// peer.
    pub fn match_index(&self, id: &str) -> i64 {
        self.peers
            .lock()
            .unwrap()
            .get(id)
            .map_or(-1, |progress| progress.match_index)
    }

    /// Record a successful append: everything below `next_index` is on the
    /// peer, and the peer is reachable.
    pub fn record_success(&self, id: &str, next_index: i64) {
        if let Some(progress) = self.peers.lock().unwrap().get_mut(id) {
            progress.match_index = next_index - 1;
            progress.next_index = next_index;
            progress.available = true;
        }
    }

    /// Walk the peer's match index back one entry after a log-match
    /// rejection.
    pub fn back_off(&self, id: &str) {
        if let Some(progress) = self.peers.lock().unwrap().get_mut(id) {
            progress.match_index -= 1;
        }
    }

    /// Record whether the last interaction with `id` succeeded.
    pub fn mark_available(&self, id: &str, available: bool) {
        if let Some(progress) = self.peers.lock().unwrap().get_mut(id) {
            progress.available = available;
        }
    }

    /// The number of peers whose confirmed replication reaches `index`.
    pub fn count_matching(&self, index: i64) -> usize {
        self.peers
            .lock()
            .unwrap()
            .values()
            .filter(|progress| progress.match_index >= index)
            .count()
    }
}
