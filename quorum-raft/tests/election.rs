use anyhow::Result;
use quorum_raft::proto::VoteRequest;
use quorum_raft::Role;

mod fixtures;
use fixtures::{new_node, node_ident, read_term, MockNetwork, N0, N1, N2};

/// A candidate granted votes by both peers wins the election, takes the
/// leader role, and starts its grace window with votes disabled.
#[tokio::test(flavor = "multi_thread")]
async fn election_won_with_full_grant() -> Result<()> {
    fixtures::init_tracing();
    let dir = tempfile::tempdir()?;

    let network = MockNetwork::new();
    network.grant_vote_from(N1, 1);
    network.grant_vote_from(N2, 1);
    let (node, _db, _reset) = new_node(network, N0, &[N1, N2], dir.path()).await;

    assert!(node.do_election().await?);

    let metrics = node.metrics().await;
    assert_eq!(metrics.role, Role::Leader);
    assert_eq!(metrics.term, 1);

    // the self-vote is durable
    let record = read_term(dir.path());
    assert_eq!(record.term, 1);
    assert_eq!(record.voted_for, Some(node_ident(N0)));

    // grace window: a valid newer-term candidate is still refused
    let reply = node
        .handle_vote(VoteRequest {
            term: 2,
            candidate: Some(node_ident(N1)),
            last_log_index: -1,
            last_log_term: 0,
        })
        .await?;
    assert!(!reply.vote_granted);
    Ok(())
}

/// One grant plus the self-vote is a majority of three.
#[tokio::test(flavor = "multi_thread")]
async fn election_won_with_bare_majority() -> Result<()> {
    fixtures::init_tracing();
    let dir = tempfile::tempdir()?;

    let network = MockNetwork::new();
    network.grant_vote_from(N1, 1);
    network.deny_vote_from(N2, 1);
    let (node, _db, _reset) = new_node(network, N0, &[N1, N2], dir.path()).await;

    assert!(node.do_election().await?);
    assert_eq!(node.metrics().await.role, Role::Leader);
    Ok(())
}

/// A failed election adopts the highest term reported by any denier, along
/// with the peer that reported it, and the node stays a follower.
#[tokio::test(flavor = "multi_thread")]
async fn lost_election_adopts_highest_term_seen() -> Result<()> {
    fixtures::init_tracing();
    let dir = tempfile::tempdir()?;

    let network = MockNetwork::new();
    network.deny_vote_from(N1, 9);
    network.deny_vote_from(N2, 4);
    let (node, _db, _reset) = new_node(network, N0, &[N1, N2], dir.path()).await;

    assert!(!node.do_election().await?);

    let metrics = node.metrics().await;
    assert_eq!(metrics.role, Role::Follower);
    assert_eq!(metrics.term, 9);
    assert_eq!(metrics.current_leader, Some(N1.to_string()));

    let record = read_term(dir.path());
    assert_eq!(record.term, 9);
    assert_eq!(record.voted_for, Some(node_ident(N1)));
    Ok(())
}

/// With every peer unreachable the election fails, but the candidate's own
/// term bump and self-vote remain durable, and the peers are marked
/// unavailable.
#[tokio::test(flavor = "multi_thread")]
async fn lost_election_with_unreachable_peers() -> Result<()> {
    fixtures::init_tracing();
    let dir = tempfile::tempdir()?;

    let network = MockNetwork::new();
    network.make_unreachable(N1);
    network.make_unreachable(N2);
    let (node, _db, _reset) = new_node(network, N0, &[N1, N2], dir.path()).await;

    assert!(!node.do_election().await?);

    let metrics = node.metrics().await;
    assert_eq!(metrics.term, 1);
    assert_eq!(metrics.role, Role::Follower);
    assert_eq!(metrics.peers_available, 1);
    assert_eq!(metrics.peers_total, 3);

    let record = read_term(dir.path());
    assert_eq!(record.term, 1);
    assert_eq!(record.voted_for, Some(node_ident(N0)));
    Ok(())
}

/// Winning an election resets every peer's replication progress: the first
/// append after the win ships the full log from the very start.
#[tokio::test(flavor = "multi_thread")]
async fn win_resets_replication_progress() -> Result<()> {
    fixtures::init_tracing();
    let dir = tempfile::tempdir()?;

    let network = MockNetwork::new();
    network.grant_vote_from(N1, 1);
    network.grant_vote_from(N2, 1);
    network.accept_appends_from(N1, 1);
    network.accept_appends_from(N2, 1);
    let (node, db, _reset) = new_node(network.clone(), N0, &[N1, N2], dir.path()).await;

    assert!(node.do_election().await?);
    node.set("stuff", "things").await?;

    // the write committed and applied locally
    assert_eq!(db.get("stuff"), Some("things".to_string()));
    assert_eq!(node.metrics().await.commit_index, 0);

    // both peers were shipped the whole log starting before index 0
    let requests = network.append_requests();
    assert_eq!(requests.len(), 2);
    for (_, req) in requests {
        assert_eq!(req.prev_log_index, -1);
        assert_eq!(req.prev_log_term, 0);
        assert_eq!(req.entries.len(), 1);
        assert_eq!(req.leader.as_ref().map(|l| l.id.as_str()), Some(N0));
    }
    Ok(())
}
