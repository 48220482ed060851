//! Fixtures for testing the consensus core.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use anyhow::{anyhow, bail, Result};
use memkv::Database;
use prost::Message;
use quorum_raft::async_trait::async_trait;
use quorum_raft::proto::{
    AppendReply, AppendRequest, LogRecord, LogStore, Node, TermRecord, VoteReply, VoteRequest,
};
use quorum_raft::{Config, RaftNetwork, RaftNode, ResetSignal};
use tokio::sync::RwLock;
use tracing_subscriber::prelude::*;

pub const N0: &str = "localhost:16990";
pub const N1: &str = "localhost:16991";
pub const N2: &str = "localhost:16992";

/// Initialize the tracing system.
pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::Layer::default().with_ansi(false);
    let subscriber = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(fmt_layer);
    // tests in one binary share the process; the first one wins
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// The client-facing address a node advertises, derived from its id.
pub fn client_addr(id: &str) -> String {
    format!("client-{}", id)
}

/// The wire identity a node presents for the given id.
pub fn node_ident(id: &str) -> Node {
    Node {
        id: id.to_string(),
        client_addr: client_addr(id),
    }
}

/// A config with test-friendly RPC deadlines (in-process routing does not
/// hold single-digit-millisecond deadlines reliably under load).
pub fn test_config(id: &str, peers: &[&str], dir: &Path) -> Arc<Config> {
    Arc::new(
        Config::build(id, client_addr(id), dir)
            .peers(peers.iter().map(|s| s.to_string()).collect())
            .vote_rpc_timeout(500)
            .append_rpc_timeout(500)
            .validate()
            .expect("failed to build config"),
    )
}

/// Build a node over the given network, storing under `dir`.
pub async fn new_node<N: RaftNetwork>(
    network: Arc<N>,
    id: &str,
    peers: &[&str],
    dir: &Path,
) -> (Arc<RaftNode<N, Database>>, Arc<Database>, ResetSignal) {
    let config = test_config(id, peers, dir);
    let db = Arc::new(Database::new());
    let (node, reset) = RaftNode::new(config, network, db.clone())
        .await
        .expect("failed to create node");
    (Arc::new(node), db, reset)
}

/// Seed the durable term record a node will load at startup.
pub fn seed_term(dir: &Path, term: i64, voted_for: Option<Node>) {
    std::fs::create_dir_all(dir).unwrap();
    let record = TermRecord { term, voted_for };
    std::fs::write(dir.join("term"), record.encode_to_vec()).unwrap();
}

/// Seed the durable log a node will load at startup.
pub fn seed_log(dir: &Path, entries: Vec<LogRecord>) {
    std::fs::create_dir_all(dir).unwrap();
    let store = LogStore { entries };
    std::fs::write(dir.join("raftlog"), store.encode_to_vec()).unwrap();
}

/// Read back the durable term record under `dir`.
pub fn read_term(dir: &Path) -> TermRecord {
    let buf = std::fs::read(dir.join("term")).expect("term file missing");
    TermRecord::decode(buf.as_slice()).expect("term file undecodable")
}

/// Read back the durable log under `dir`.
pub fn read_log(dir: &Path) -> LogStore {
    let buf = std::fs::read(dir.join("raftlog")).expect("raftlog file missing");
    LogStore::decode(buf.as_slice()).expect("raftlog file undecodable")
}

//////////////////////////////////////////////////////////////////////////////////////////////////
//////////////////////////////////////////////////////////////////////////////////////////////////

/// An in-process network which routes RPCs to real nodes, for multi-node
/// cluster tests.
#[derive(Default)]
pub struct Router {
    table: RwLock<BTreeMap<String, Arc<RaftNode<Router, Database>>>>,
}

impl Router {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a node under its id so peers can reach it.
    pub async fn register(&self, id: &str, node: Arc<RaftNode<Router, Database>>) {
        self.table.write().await.insert(id.to_string(), node);
    }

    /// Drop a node from the routing table, making it unreachable.
    pub async fn remove(&self, id: &str) -> Option<Arc<RaftNode<Router, Database>>> {
        self.table.write().await.remove(id)
    }

    async fn route(&self, target: &str) -> Result<Arc<RaftNode<Router, Database>>> {
        self.table
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| anyhow!("no route to {}", target))
    }
}

#[async_trait]
impl RaftNetwork for Router {
    async fn connect(&self, _target: &str) -> Result<()> {
        // peers register after construction; routing fails until they do
        Ok(())
    }

    async fn vote(&self, target: &str, rpc: VoteRequest) -> Result<VoteReply> {
        Ok(self.route(target).await?.handle_vote(rpc).await?)
    }

    async fn append_logs(&self, target: &str, rpc: AppendRequest) -> Result<AppendReply> {
        Ok(self.route(target).await?.handle_append(rpc).await?)
    }

    async fn disconnect(&self, _target: &str) {}
}

//////////////////////////////////////////////////////////////////////////////////////////////////
//////////////////////////////////////////////////////////////////////////////////////////////////

/// A network with scripted per-peer replies, for driving a single node
/// through elections and replication without real peers.
#[derive(Default)]
pub struct MockNetwork {
    vote_replies: StdMutex<HashMap<String, VoteReply>>,
    append_replies: StdMutex<HashMap<String, AppendReply>>,
    unreachable: StdMutex<HashSet<String>>,
    append_requests: StdMutex<Vec<(String, AppendRequest)>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script `id` to grant votes, replying with the given term.
    pub fn grant_vote_from(&self, id: &str, term: i64) {
        self.vote_replies.lock().unwrap().insert(
            id.to_string(),
            VoteReply {
                term,
                vote_granted: true,
                node: Some(node_ident(id)),
            },
        );
    }

    /// Script `id` to deny votes, replying with the given term.
    pub fn deny_vote_from(&self, id: &str, term: i64) {
        self.vote_replies.lock().unwrap().insert(
            id.to_string(),
            VoteReply {
                term,
                vote_granted: false,
                node: Some(node_ident(id)),
            },
        );
    }

    /// Script `id` to acknowledge append requests at the given term.
    pub fn accept_appends_from(&self, id: &str, term: i64) {
        self.append_replies
            .lock()
            .unwrap()
            .insert(id.to_string(), AppendReply { term, success: true });
    }

    /// Script `id` to reject append requests at the given term.
    pub fn reject_appends_from(&self, id: &str, term: i64) {
        self.append_replies
            .lock()
            .unwrap()
            .insert(id.to_string(), AppendReply { term, success: false });
    }

    /// Make every RPC to `id` fail.
    pub fn make_unreachable(&self, id: &str) {
        self.unreachable.lock().unwrap().insert(id.to_string());
    }

    /// Every append request sent so far, in send order per peer.
    pub fn append_requests(&self) -> Vec<(String, AppendRequest)> {
        self.append_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RaftNetwork for MockNetwork {
    async fn connect(&self, target: &str) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(target) {
            bail!("connection refused: {}", target);
        }
        Ok(())
    }

    async fn vote(&self, target: &str, _rpc: VoteRequest) -> Result<VoteReply> {
        if self.unreachable.lock().unwrap().contains(target) {
            bail!("unreachable: {}", target);
        }
        self.vote_replies
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted vote reply for {}", target))
    }

    async fn append_logs(&self, target: &str, rpc: AppendRequest) -> Result<AppendReply> {
        if self.unreachable.lock().unwrap().contains(target) {
            bail!("unreachable: {}", target);
        }
        self.append_requests
            .lock()
            .unwrap()
            .push((target.to_string(), rpc));
        self.append_replies
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted append reply for {}", target))
    }

    async fn disconnect(&self, _target: &str) {}
}
