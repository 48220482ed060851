//! Client write entry points.

use crate::core::RaftNode;
use crate::error::ClientWriteError;
use crate::proto::{Action, LogRecord};
use crate::{KeyValueStore, RaftNetwork};

impl<N: RaftNetwork, S: KeyValueStore> RaftNode<N, S> {
    /// Append a write record to the log and return once it is applied to
    /// the state machine, or an error is generated.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ClientWriteError> {
        tracing::info!(key, "set");
        self.apply_record(Action::Set, key, value).await
    }

    /// Append a delete record to the log and return once it is applied to
    /// the state machine, or an error is generated.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete(&self, key: &str) -> Result<(), ClientWriteError> {
        tracing::info!(key, "delete");
        self.apply_record(Action::Del, key, "").await
    }

    /// Append a record, replicate it to a majority, and verify that it
    /// committed.
    ///
    /// The node lock is held for the full append+replicate+commit span,
    /// which serializes client writes on the leader. The method does not
    /// return until the record is committed to a majority of nodes, or a
    /// majority of nodes has failed to acknowledge it (which will
    /// generally end in an election).
    async fn apply_record(
        &self,
        action: Action,
        key: &str,
        value: &str,
    ) -> Result<(), ClientWriteError> {
        let mut state = self.state.lock().await;
        if !state.role.is_leader() {
            let redirect = state.voted_for.as_ref().map(|node| node.client_addr.clone());
            return Err(ClientWriteError::ForwardToLeader(redirect));
        }

        let record = LogRecord {
            term: state.term,
            action: action as i32,
            key: key.to_string(),
            value: value.to_string(),
        };
        let mut entries = state.log.clone();
        entries.push(record);
        let index = self.set_log(&mut state, entries).await?;

        let term = state.term;
        let retries = self.config.client_append_retries;
        self.send_append_locked(&mut state, retries, term).await?;

        if state.commit_index < index {
            tracing::error!(
                record_index = index,
                commit_index = state.commit_index,
                "commit index failed to update after append"
            );
            return Err(ClientWriteError::CommitFailed {
                index,
                commit_index: state.commit_index,
            });
        }
        Ok(())
    }
}
