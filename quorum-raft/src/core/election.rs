//! The election engine.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::core::{RaftNode, Role};
use crate::error::RaftResult;
use crate::proto::{Node, VoteReply, VoteRequest};
use crate::{KeyValueStore, RaftNetwork};

impl<N: RaftNetwork, S: KeyValueStore> RaftNode<N, S> {
    /// Run one election round, returning whether this node won.
    ///
    /// The term is bumped and the self-vote persisted up front; vote
    /// requests then fan out to every peer in parallel and the tally is
    /// inspected only after all replies (or their deadlines) are in. On a
    /// majority the node becomes leader with fresh replication progress
    /// and its grace window engaged; otherwise it stays a follower,
    /// adopting the highest term any peer reported.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn do_election(&self) -> RaftResult<bool> {
        let (term, last_log_index, last_log_term) = {
            let mut state = self.state.lock().await;
            let me = self.this_node().clone();
            let next = state.term + 1;
            self.set_term(&mut state, next, Some(me)).await?;
            (state.term, state.last_log_index(), state.last_log_term())
        };

        let targets = self.peers.ids();
        let num_nodes = targets.len() + 1;
        let majority = self.majority();
        tracing::info!(
            term,
            cluster_size = num_nodes,
            needed = majority,
            "becoming candidate"
        );

        let req = VoteRequest {
            term,
            candidate: Some(self.this_node().clone()),
            last_log_index,
            last_log_term,
        };
        let replies = join_all(
            targets
                .iter()
                .map(|target| self.request_vote(target, req.clone())),
        )
        .await;

        // tally only after the join barrier: one for self, one per grant
        let mut num_votes = 1usize;
        let mut max_term_seen = term;
        let mut max_term_source: Option<Node> = None;
        for reply in replies.into_iter().flatten() {
            if reply.vote_granted {
                num_votes += 1;
            } else if reply.term > max_term_seen {
                max_term_seen = reply.term;
                max_term_source = reply.node;
            }
        }

        let mut state = self.state.lock().await;
        if num_votes >= majority && state.term == term {
            tracing::info!(needed = majority, got = num_votes, term, "election succeeded");
            state.role = Role::Leader;
            // the election driver restores this after the grace window
            state.allow_vote = false;
            self.peers.reset_progress(state.log.len() as i64);
            Ok(true)
        } else {
            tracing::info!(needed = majority, got = num_votes, term, "election failed");
            if max_term_seen > state.term {
                tracing::info!(
                    max_term_seen,
                    source = ?max_term_source.as_ref().map(|n| &n.id),
                    "updating term to max seen"
                );
                self.set_term(&mut state, max_term_seen, max_term_source).await?;
            }
            Ok(false)
        }
    }

    /// Request a vote from a single peer, within the vote RPC deadline.
    async fn request_vote(&self, target: &str, req: VoteRequest) -> Option<VoteReply> {
        let deadline = Duration::from_millis(self.config.vote_rpc_timeout);
        match timeout(deadline, self.network.vote(target, req)).await {
            Ok(Ok(reply)) => {
                self.peers.mark_available(target, true);
                Some(reply)
            }
            Ok(Err(err)) => {
                tracing::warn!(peer = %target, error = %err, "error requesting vote from peer");
                self.peers.mark_available(target, false);
                None
            }
            Err(_) => {
                tracing::warn!(peer = %target, timeout = ?deadline, "vote request timed out");
                self.peers.mark_available(target, false);
                None
            }
        }
    }
}
