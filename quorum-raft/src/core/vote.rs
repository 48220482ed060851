//! The RequestVote handler.

use crate::core::{NodeState, RaftNode};
use crate::error::RaftResult;
use crate::proto::{VoteReply, VoteRequest};
use crate::{KeyValueStore, RaftNetwork};

impl<N: RaftNetwork, S: KeyValueStore> RaftNode<N, S> {
    /// Respond to a vote request from a candidate node (§5.2).
    ///
    /// The reply's term always carries this node's current term after the
    /// handler has run, so a stale candidate can update itself.
    #[tracing::instrument(
        level = "trace",
        skip(self, req),
        fields(candidate = req.candidate.as_ref().map(|c| c.id.as_str()).unwrap_or(""), rpc_term = req.term),
    )]
    pub async fn handle_vote(&self, req: VoteRequest) -> RaftResult<VoteReply> {
        let mut state = self.state.lock().await;
        let mut granted = false;

        if req.term < state.term {
            tracing::debug!(term = state.term, "vote request for a past term");
        } else if req.term == state.term {
            tracing::debug!(term = state.term, "vote request for the current term");
            // A restarted former leader that re-runs an election for the
            // current term has voted for itself and will not accept appends
            // from this leader. Stepping the term here forces the cluster to
            // converge instead of leaving a doomed stand-off until the next
            // election timeout.
            if state.role.is_leader() {
                let me = self.this_node().clone();
                let next = state.term + 1;
                self.set_term(&mut state, next, Some(me)).await?;
            }
        } else if !req
            .candidate
            .as_ref()
            .map_or(false, |candidate| self.peers.contains(&candidate.id))
        {
            tracing::warn!(
                candidate = ?req.candidate.as_ref().map(|c| &c.id),
                "vote request from unknown candidate"
            );
        } else if !state.candidate_log_up_to_date(req.last_log_index, req.last_log_term) {
            tracing::debug!(
                candidate_index = req.last_log_index,
                candidate_term = req.last_log_term,
                commit_index = state.commit_index,
                "candidate log not up to date"
            );
        } else if !state.allow_vote {
            tracing::debug!("still within leader grace window, refusing vote");
        } else {
            granted = true;
            self.reset_election_timer(&mut state);
            self.set_term(&mut state, req.term, req.candidate.clone()).await?;
        }

        tracing::info!(term = state.term, granted, "vote request handled");
        Ok(VoteReply {
            term: state.term,
            vote_granted: granted,
            node: Some(self.this_node().clone()),
        })
    }
}

impl NodeState {
    /// Whether a candidate's log is sufficient to earn this node's vote:
    /// the candidate must hold at least every entry this node knows to be
    /// committed.
    pub(crate) fn candidate_log_up_to_date(&self, c_log_index: i64, c_log_term: i64) -> bool {
        if c_log_index > self.commit_index {
            return true;
        }
        if c_log_index == -1 && self.commit_index == -1 {
            return true;
        }
        c_log_index == self.commit_index
            && self
                .log
                .get(c_log_index as usize)
                .map(|record| record.term)
                == Some(c_log_term)
    }
}
