//! The AppendEntries handler.

use crate::core::{NodeState, RaftNode};
use crate::error::RaftResult;
use crate::proto::{AppendReply, AppendRequest, LogRecord};
use crate::{KeyValueStore, RaftNetwork};

impl<N: RaftNetwork, S: KeyValueStore> RaftNode<N, S> {
    /// Respond to an append-entries request from a leader (§5.3); also the
    /// heartbeat path (§5.2).
    #[tracing::instrument(
        level = "trace",
        skip(self, req),
        fields(
            rpc_term = req.term,
            prev_log_index = req.prev_log_index,
            prev_log_term = req.prev_log_term,
            leader_commit = req.leader_commit,
            n_entries = req.entries.len(),
        ),
    )]
    pub async fn handle_append(&self, req: AppendRequest) -> RaftResult<AppendReply> {
        let mut state = self.state.lock().await;

        let valid = self.validate_append(&mut state, &req);
        let matched = state.check_previous(req.prev_log_index, req.prev_log_term);

        let mut success = false;
        if valid && matched {
            if !req.entries.is_empty() {
                let reconciled = reconcile_logs(&state.log, req.prev_log_index, &req.entries);
                tracing::info!(
                    n_entries = req.entries.len(),
                    leader = ?req.leader.as_ref().map(|l| &l.id),
                    "appending entries from leader"
                );
                self.set_log(&mut state, reconciled).await?;
            }
            self.apply_committed_logs(&mut state, req.leader_commit);
            success = true;
        } else if valid {
            tracing::debug!("log match failed, earlier entries needed");
        }

        if valid {
            if req.term > state.term {
                tracing::info!(
                    new_term = req.term,
                    leader = ?req.leader.as_ref().map(|l| &l.id),
                    "observed more recent append, updating term record"
                );
                self.set_term(&mut state, req.term, req.leader.clone()).await?;
            }
            // Reset the timer again on the way out so the work done in this
            // handler is invisible to the election timeout.
            self.reset_election_timer(&mut state);
        }

        Ok(AppendReply {
            term: state.term,
            success,
        })
    }

    /// Check that the request comes from a current, legitimate leader.
    /// Any valid append resets the election timer, even one that will fail
    /// the log-match check, so an actively probed follower is not pushed
    /// into an election.
    fn validate_append(&self, state: &mut NodeState, req: &AppendRequest) -> bool {
        let leader = match req.leader.as_ref() {
            Some(leader) => leader,
            None => return false,
        };
        if req.term < state.term {
            return false;
        }
        if req.term == state.term {
            // Two leaders in one term is impossible; the peer we voted for
            // is the only legitimate sender at this term.
            let impostor = state
                .voted_for
                .as_ref()
                .map_or(true, |voted| voted.id != leader.id);
            if impostor {
                tracing::error!(
                    term = state.term,
                    got = %leader.id,
                    expected = ?state.voted_for.as_ref().map(|v| &v.id),
                    "append request leader mismatch"
                );
                return false;
            }
        }
        self.reset_election_timer(state);
        true
    }

    /// Advance the commit index toward the leader's and apply the newly
    /// committed records to the key-value store.
    fn apply_committed_logs(&self, state: &mut NodeState, leader_commit: i64) {
        if leader_commit <= state.commit_index {
            return;
        }
        tracing::debug!(
            current = state.commit_index,
            leader = leader_commit,
            "applying committed records"
        );
        // never run past the end of the local log
        let target = leader_commit.min(state.last_log_index());
        if target > state.commit_index {
            state.commit_index = target;
        }
        self.apply_committed(state);
    }
}

impl NodeState {
    /// True if the log contains an entry at `prev_index` with term
    /// `prev_term`. An index below zero always matches.
    pub(crate) fn check_previous(&self, prev_index: i64, prev_term: i64) -> bool {
        if prev_index < 0 {
            return true;
        }
        self.log
            .get(prev_index as usize)
            .map_or(false, |record| record.term == prev_term)
    }
}

/// Merge the incoming entries into the local log.
///
/// Entries after `prev_log_index` are scanned alongside the incoming ones;
/// at the first index where the terms differ, or where the local log holds
/// entries beyond the incoming payload, the local suffix is dropped
/// (§5.3). Incoming entries not already present are then appended.
fn reconcile_logs(log: &[LogRecord], prev_log_index: i64, incoming: &[LogRecord]) -> Vec<LogRecord> {
    let base = (prev_log_index + 1) as usize;
    let mut present = 0;
    while present < incoming.len()
        && base + present < log.len()
        && log[base + present].term == incoming[present].term
    {
        present += 1;
    }
    let keep = base + present;
    if keep < log.len() {
        tracing::debug!(mismatch = keep, "rewinding log to mismatch point");
    }
    let mut reconciled = log[..keep].to_vec();
    reconciled.extend_from_slice(&incoming[present..]);
    reconciled
}
