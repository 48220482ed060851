//! The election and heartbeat driver.
//!
//! The consensus handlers are passive: something has to notice election
//! timeouts, start elections, and keep a leader's heartbeats flowing. This
//! module is that something. It runs as one spawned task per node:
//!
//! - As a follower, it races a randomized election timeout against the
//!   node's reset signals. Every valid append or granted vote resets the
//!   timer; silence long enough triggers an election.
//! - On an election win, it schedules the restore of the node's
//!   willingness to vote once the leader grace window has passed.
//! - As a leader, it broadcasts an append round every heartbeat interval,
//!   which doubles as the channel through which followers learn the
//!   commit index. It drops back to the follower timer as soon as the
//!   node steps down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::core::{RaftNode, ResetSignal};
use crate::error::ReplicationError;
use crate::{KeyValueStore, RaftNetwork};

/// Spawn the driver task for a node.
///
/// The task runs until the reset channel closes or the handle is aborted.
pub fn spawn<N: RaftNetwork, S: KeyValueStore>(
    node: Arc<RaftNode<N, S>>,
    reset: ResetSignal,
) -> JoinHandle<()> {
    tokio::spawn(run(node, reset))
}

/// The driver loop. See the module docs for the state it cycles through.
#[tracing::instrument(level = "debug", skip(node, reset))]
pub async fn run<N: RaftNetwork, S: KeyValueStore>(
    node: Arc<RaftNode<N, S>>,
    mut reset: ResetSignal,
) {
    loop {
        let metrics = node.metrics().await;
        if metrics.role.is_leader() {
            sleep(Duration::from_millis(node.config().heartbeat_interval)).await;
            match node.send_append(0, metrics.term).await {
                Ok(()) => {}
                Err(ReplicationError::NotLeader) | Err(ReplicationError::ExpiredTerm { .. }) => {
                    tracing::info!("stepped down, stopping heartbeats");
                }
                Err(err) => {
                    // a missed round is not fatal; the next tick retries
                    tracing::warn!(error = %err, "heartbeat round failed");
                }
            }
        } else {
            let timeout = Duration::from_millis(node.config().new_rand_election_timeout());
            tokio::select! {
                _ = sleep(timeout) => {
                    tracing::debug!(?timeout, "election timer expired");
                    match node.do_election().await {
                        Ok(true) => schedule_grace_restore(&node),
                        Ok(false) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "election aborted by storage error");
                            return;
                        }
                    }
                }
                signal = reset.recv() => {
                    if signal.is_none() {
                        tracing::debug!("reset channel closed, stopping driver");
                        return;
                    }
                    // timer restarts with a fresh random timeout
                }
            }
        }
    }
}

/// After the grace window passes, let the fresh leader grant votes again.
fn schedule_grace_restore<N: RaftNetwork, S: KeyValueStore>(node: &Arc<RaftNode<N, S>>) {
    let node = node.clone();
    let window = Duration::from_millis(node.config().leader_grace_window);
    tokio::spawn(async move {
        sleep(window).await;
        node.set_allow_vote(true).await;
        tracing::debug!(?window, "leader grace window ended, votes allowed again");
    });
}
