//! Durable storage of the term record and the log.
//!
//! Two files live under the data directory: `term` holds the serialized
//! [`TermRecord`] and `raftlog` the serialized [`LogStore`]. Both are
//! length-delimited tagged binary in the same wire format the RPC surface
//! uses, so the files remain readable across builds.
//!
//! Every save rewrites the whole file through a temp sibling which is
//! fsynced and then renamed over the target, so a crash mid-write leaves
//! the previous contents intact rather than a torn record.

use std::path::{Path, PathBuf};

use prost::Message;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::StorageError;
use crate::proto::{LogStore, TermRecord};

/// Handle to the durable state of one node.
pub struct StableStore {
    term_path: PathBuf,
    log_path: PathBuf,
}

impl StableStore {
    pub fn new(config: &Config) -> Self {
        Self {
            term_path: config.term_file(),
            log_path: config.log_file(),
        }
    }

    /// Load the persisted term record.
    ///
    /// A missing file yields the zero record (term 0, no vote). A file
    /// that fails to decode is treated the same way, after logging it.
    pub async fn load_term(&self) -> Result<TermRecord, StorageError> {
        let buf = match fs::read(&self.term_path).await {
            Ok(buf) => buf,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TermRecord::default())
            }
            Err(err) => return Err(StorageError::io(&self.term_path, err)),
        };
        match TermRecord::decode(buf.as_slice()) {
            Ok(record) => Ok(record),
            Err(err) => {
                tracing::warn!(path = %self.term_path.display(), error = %err, "failed to decode term file, starting from a zero term record");
                Ok(TermRecord::default())
            }
        }
    }

    /// Persist the term record.
    pub async fn save_term(&self, record: &TermRecord) -> Result<(), StorageError> {
        write_atomic(&self.term_path, &record.encode_to_vec()).await
    }

    /// Load the persisted log.
    ///
    /// A missing file yields an empty log; an undecodable one is logged
    /// and replaced by an empty log.
    pub async fn load_log(&self) -> Result<LogStore, StorageError> {
        let buf = match fs::read(&self.log_path).await {
            Ok(buf) => buf,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogStore::default())
            }
            Err(err) => return Err(StorageError::io(&self.log_path, err)),
        };
        match LogStore::decode(buf.as_slice()) {
            Ok(store) => Ok(store),
            Err(err) => {
                tracing::warn!(path = %self.log_path.display(), error = %err, "failed to decode log file, starting from an empty log");
                Ok(LogStore::default())
            }
        }
    }

    /// Persist the full log.
    pub async fn save_log(&self, store: &LogStore) -> Result<(), StorageError> {
        write_atomic(&self.log_path, &store.encode_to_vec()).await
    }
}

/// Write `buf` to `path` through a temp sibling plus rename, so readers
/// only ever observe the previous or the new contents.
async fn write_atomic(path: &Path, buf: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|err| StorageError::io(&tmp, err))?;
    file.write_all(buf)
        .await
        .map_err(|err| StorageError::io(&tmp, err))?;
    file.sync_all()
        .await
        .map_err(|err| StorageError::io(&tmp, err))?;
    drop(file);
    fs::rename(&tmp, path)
        .await
        .map_err(|err| StorageError::io(path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{LogRecord, Node};

    fn store_in(dir: &Path) -> StableStore {
        let config = Config::build("localhost:16990", "localhost:8080", dir)
            .validate()
            .unwrap();
        StableStore::new(&config)
    }

    #[tokio::test]
    async fn missing_files_load_as_zero_values() {
        let dir = tempfile::tempdir().unwrap();
        let stable = store_in(dir.path());

        let term = stable.load_term().await.unwrap();
        assert_eq!(term.term, 0);
        assert_eq!(term.voted_for, None);

        let log = stable.load_log().await.unwrap();
        assert!(log.entries.is_empty());
    }

    #[tokio::test]
    async fn term_record_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let stable = store_in(dir.path());

        let record = TermRecord {
            term: 12,
            voted_for: Some(Node {
                id: "localhost:16991".to_string(),
                client_addr: "localhost:8081".to_string(),
            }),
        };
        stable.save_term(&record).await.unwrap();

        // a fresh handle over the same directory sees the same record
        let reloaded = store_in(dir.path()).load_term().await.unwrap();
        assert_eq!(reloaded, record);
    }

    #[tokio::test]
    async fn log_survives_reload_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let stable = store_in(dir.path());

        let first = LogStore {
            entries: vec![LogRecord::set(1, "a", "1"), LogRecord::set(1, "b", "2")],
        };
        stable.save_log(&first).await.unwrap();
        assert_eq!(stable.load_log().await.unwrap(), first);

        // a save fully replaces the previous contents
        let second = LogStore {
            entries: vec![LogRecord::set(2, "a", "9")],
        };
        stable.save_log(&second).await.unwrap();
        assert_eq!(store_in(dir.path()).load_log().await.unwrap(), second);
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_zero_values() {
        let dir = tempfile::tempdir().unwrap();
        let stable = store_in(dir.path());

        // an invalid varint stream
        fs::write(dir.path().join("term"), &[0xff, 0xff, 0xff]).await.unwrap();
        let term = stable.load_term().await.unwrap();
        assert_eq!(term, TermRecord::default());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let stable = store_in(dir.path());
        stable.save_term(&TermRecord { term: 3, voted_for: None }).await.unwrap();

        assert!(dir.path().join("term").exists());
        assert!(!dir.path().join("term.tmp").exists());
    }
}
