//! Peer refresh against a local peer list endpoint.

use push_validator_cli::node::NodeHome;
use push_validator_cli::peers::{PeerRefresher, RefreshOutcome, read_peers};
use push_validator_cli::test_utils::{FakeSupervisor, TestServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CONFIG: &str = r#"# Tendermint node configuration
moniker = "validator-1"

[p2p]
# Comma separated list of nodes to keep persistent connections to
persistent_peers = "PEERS"
max_num_inbound_peers = 40
"#;

struct Node {
    _dir: TempDir,
    home: NodeHome,
}

impl Node {
    fn with_peers(peers: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let home = NodeHome::new(dir.path());
        std::fs::create_dir_all(home.config_dir()).unwrap();
        std::fs::write(home.daemon_config(), CONFIG.replace("PEERS", peers)).unwrap();
        Self {
            _dir: dir,
            home,
        }
    }

    fn peers(&self) -> Vec<String> {
        read_peers(&self.home.daemon_config()).unwrap()
    }

    /// Log lines with the timestamp stripped.
    fn log_messages(&self) -> Vec<String> {
        std::fs::read_to_string(self.home.peer_refresh_log())
            .unwrap_or_default()
            .lines()
            .map(|line| line.splitn(3, ' ').nth(2).unwrap_or_default().to_string())
            .collect()
    }
}

fn refresher(supervisor: &Arc<FakeSupervisor>) -> PeerRefresher {
    PeerRefresher::new(supervisor.clone())
        .unwrap()
        .with_restart_delay(Duration::ZERO)
        .with_bin_path(PathBuf::from("/usr/local/bin/pchaind"))
}

#[tokio::test]
async fn test_reordered_peers_are_unchanged() {
    let server = TestServer::start().await;
    server.route("/peers.json", 200, r#"["C@3:26656", "A@1:26656", "B@2:26656"]"#);
    let node = Node::with_peers("A@1:26656,B@2:26656,C@3:26656");
    let supervisor = Arc::new(FakeSupervisor::running(true));

    let outcome = refresher(&supervisor).refresh(&node.home, &server.url("/peers.json"), 20).await;

    assert_eq!(
        outcome,
        RefreshOutcome::Unchanged {
            peers: 3
        }
    );
    assert_eq!(node.log_messages(), vec!["peers unchanged (3 peers)"]);
    assert!(supervisor.calls().is_empty());
}

#[tokio::test]
async fn test_new_peer_set_restarts_running_node() {
    let server = TestServer::start().await;
    server.route("/peers.json", 200, r#"{"peers": ["C@3:26656", "D@4:26656", "E@5:26656"]}"#);
    let node = Node::with_peers("A@1:26656,B@2:26656");
    let supervisor = Arc::new(FakeSupervisor::running(true));

    let outcome = refresher(&supervisor).refresh(&node.home, &server.url("/peers.json"), 20).await;

    assert_eq!(
        outcome,
        RefreshOutcome::Updated {
            before: 2,
            after: 3,
            restarted: true,
        }
    );
    assert_eq!(node.peers(), vec!["C@3:26656", "D@4:26656", "E@5:26656"]);
    assert_eq!(
        node.log_messages(),
        vec![
            "peers updated: 2 -> 3 peers",
            "restarting node to apply new peers...",
            "node restarted successfully",
        ]
    );
    assert_eq!(supervisor.calls(), vec!["stop", "start"]);
    let started = supervisor.start_options();
    assert_eq!(started[0].home_dir, node.home.root());
    assert_eq!(started[0].bin_path, PathBuf::from("/usr/local/bin/pchaind"));

    // Comments and unrelated keys survive the edit.
    let config = std::fs::read_to_string(node.home.daemon_config()).unwrap();
    assert!(config.contains("# Comma separated list of nodes"));
    assert!(config.contains("max_num_inbound_peers = 40"));
}

#[tokio::test]
async fn test_stopped_node_is_not_started() {
    let server = TestServer::start().await;
    server.route("/peers.txt", 200, "C@3:26656\nD@4:26656\n");
    let node = Node::with_peers("A@1:26656");
    let supervisor = Arc::new(FakeSupervisor::running(false));

    let outcome = refresher(&supervisor).refresh(&node.home, &server.url("/peers.txt"), 20).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Updated {
            restarted: false,
            ..
        }
    ));
    assert_eq!(node.peers(), vec!["C@3:26656", "D@4:26656"]);
    assert!(supervisor.calls().is_empty());
}

#[tokio::test]
async fn test_peer_list_is_capped() {
    let server = TestServer::start().await;
    server.route("/peers.json", 200, r#"["A@1:1", "B@2:2", "C@3:3", "D@4:4"]"#);
    let node = Node::with_peers("");
    let supervisor = Arc::new(FakeSupervisor::running(false));

    refresher(&supervisor).refresh(&node.home, &server.url("/peers.json"), 2).await;

    assert_eq!(node.peers(), vec!["A@1:1", "B@2:2"]);
}

#[tokio::test]
async fn test_unreachable_list_keeps_peers() {
    let server = TestServer::start().await;
    let node = Node::with_peers("A@1:26656,B@2:26656");
    let supervisor = Arc::new(FakeSupervisor::running(true));

    let outcome = refresher(&supervisor).refresh(&node.home, &server.url("/missing"), 20).await;

    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
    assert_eq!(node.peers(), vec!["A@1:26656", "B@2:26656"]);
    let messages = node.log_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("ERROR:"), "{messages:?}");
    assert!(messages[0].contains("404"), "{messages:?}");
    assert!(supervisor.calls().is_empty());
}

#[tokio::test]
async fn test_empty_list_is_an_error() {
    let server = TestServer::start().await;
    server.route("/peers.json", 200, "[]");
    let node = Node::with_peers("A@1:26656");
    let supervisor = Arc::new(FakeSupervisor::running(true));

    let outcome = refresher(&supervisor).refresh(&node.home, &server.url("/peers.json"), 20).await;

    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
    assert_eq!(node.peers(), vec!["A@1:26656"]);
    assert!(node.log_messages()[0].contains("empty"));
}

#[tokio::test]
async fn test_stuck_node_is_reported() {
    let server = TestServer::start().await;
    server.route("/peers.json", 200, r#"["B@2:26656"]"#);
    let node = Node::with_peers("A@1:26656");
    let supervisor = Arc::new(FakeSupervisor::stuck());

    let outcome = refresher(&supervisor).refresh(&node.home, &server.url("/peers.json"), 20).await;

    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
    // The new peers are already written; they apply on the next start.
    assert_eq!(node.peers(), vec!["B@2:26656"]);
    let messages = node.log_messages();
    assert_eq!(messages[1], "restarting node to apply new peers...");
    assert!(messages[2].starts_with("ERROR: failed to stop node"), "{messages:?}");
    assert_eq!(supervisor.calls(), vec!["stop"]);
}
