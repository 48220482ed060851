//! The replication engine: leader-side append broadcasts and commit-index
//! advancement.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::core::{NodeState, RaftNode};
use crate::error::ReplicationError;
use crate::proto::{AppendRequest, LogRecord};
use crate::{KeyValueStore, RaftNetwork};

impl<N: RaftNetwork, S: KeyValueStore> RaftNode<N, S> {
    /// Broadcast append-entries to every peer, retrying the whole round up
    /// to `retries` more times if a quorum is not reached.
    ///
    /// This is the heartbeat entry point: the leader driver calls it with
    /// `retries = 0` on every heartbeat tick.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn send_append(&self, retries: u32, term: i64) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().await;
        self.send_append_locked(&mut state, retries, term).await
    }

    /// The broadcast body, run with the node lock held. Role and term are
    /// re-checked at the top of every attempt; because every role/term
    /// mutation also needs the node lock, they cannot shift underneath a
    /// running attempt.
    pub(crate) async fn send_append_locked(
        &self,
        state: &mut NodeState,
        retries: u32,
        term: i64,
    ) -> Result<(), ReplicationError> {
        let majority = self.majority();
        let mut attempts_left = retries;
        loop {
            if !state.role.is_leader() {
                return Err(ReplicationError::NotLeader);
            }
            if term != state.term {
                return Err(ReplicationError::ExpiredTerm {
                    requested: term,
                    current: state.term,
                });
            }

            let log = Arc::new(state.log.clone());
            let leader_commit = state.commit_index;
            let targets = self.peers.ids();
            let results = join_all(targets.iter().map(|target| {
                self.request_append(target, term, log.clone(), leader_commit)
            }))
            .await;

            // one for self, one per acknowledging peer
            let appended = 1 + results
                .iter()
                .filter(|result| result.is_ok())
                .count();
            tracing::trace!(appended, needed = majority, "append round finished");

            if appended >= majority {
                self.commit_records(state);
                return Ok(());
            }
            if attempts_left == 0 {
                return Err(ReplicationError::QuorumNotReached {
                    appended,
                    needed: majority,
                });
            }
            attempts_left -= 1;
        }
    }

    /// Ship the log suffix one peer has not confirmed, walking the peer's
    /// match index back one entry per log-match rejection until the logs
    /// agree or the start of the log is reached.
    async fn request_append(
        &self,
        target: &str,
        term: i64,
        log: Arc<Vec<LogRecord>>,
        leader_commit: i64,
    ) -> Result<(), ReplicationError> {
        let deadline = Duration::from_millis(self.config.append_rpc_timeout);
        let next_index = log.len() as i64;
        loop {
            let prev_log_index = self.peers.match_index(target);
            let prev_log_term = if prev_log_index >= 0 {
                log[prev_log_index as usize].term
            } else {
                0
            };
            let req = AppendRequest {
                term,
                leader: Some(self.this_node().clone()),
                prev_log_index,
                prev_log_term,
                leader_commit,
                entries: log[(prev_log_index + 1) as usize..].to_vec(),
            };

            let reply = match timeout(deadline, self.network.append_logs(target, req)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => {
                    tracing::debug!(peer = %target, error = %err, "error requesting append from peer");
                    self.peers.mark_available(target, false);
                    return Err(ReplicationError::Network {
                        target: target.to_string(),
                        source: err,
                    });
                }
                Err(_) => {
                    tracing::debug!(peer = %target, timeout = ?deadline, "append request timed out");
                    self.peers.mark_available(target, false);
                    return Err(ReplicationError::Timeout {
                        target: target.to_string(),
                        timeout: deadline,
                    });
                }
            };

            if reply.success {
                self.peers.record_success(target, next_index);
                return Ok(());
            }
            if prev_log_index > 0 {
                self.peers.back_off(target);
                continue;
            }
            self.peers.mark_available(target, false);
            return Err(ReplicationError::RangeExhausted {
                target: target.to_string(),
            });
        }
    }

    /// Advance the commit index to the highest log index replicated on a
    /// majority of nodes, then apply the newly committed records.
    ///
    /// The scan runs downward from the end of the log so the first index
    /// with majority coverage wins.
    #[tracing::instrument(level = "trace", skip(self, state))]
    pub(crate) fn commit_records(&self, state: &mut NodeState) {
        let majority = self.majority();
        let mut index = state.last_log_index();
        while index > state.commit_index {
            let replicated = 1 + self.peers.count_matching(index);
            if replicated >= majority {
                tracing::info!(
                    prev_commit_index = state.commit_index,
                    new_commit_index = index,
                    "commit index updated"
                );
                state.commit_index = index;
                break;
            }
            index -= 1;
        }
        self.apply_committed(state);
    }
}
