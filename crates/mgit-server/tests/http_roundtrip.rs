//! Push and pull through a real listener.

use std::sync::Arc;

use mgit_graph::{CommitGraph, LocalIdentity, StagedEntry};
use mgit_protocol::AuthMethod;
use mgit_refs::{branch_ref, InMemoryRefStore, RefStore};
use mgit_server::{MgitServer, ServerConfig, TokenConfig};
use mgit_store::{InMemoryObjectStore, ObjectStore};
use mgit_sync::{HttpTransport, MergeStatus, RetryPolicy, SyncEngine, SyncError, SyncState};
use mgit_types::ObjectId;
use tokio::net::TcpListener;

const TOKEN: &str = "clinic-token";

async fn start_server(repos_root: Option<std::path::PathBuf>) -> String {
    let config = ServerConfig {
        repos_root,
        tokens: vec![TokenConfig {
            name: "clinic".into(),
            token: TOKEN.into(),
            repos: vec![],
            read_only: false,
        }],
        ..ServerConfig::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = MgitServer::new(config).unwrap();
    tokio::spawn(server.serve_on(listener));
    format!("http://{addr}")
}

struct Client {
    graph: CommitGraph,
    engine: SyncEngine,
    identity: LocalIdentity,
}

impl Client {
    fn new(identity: LocalIdentity) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let refs: Arc<dyn RefStore> = Arc::new(InMemoryRefStore::new());
        let graph = CommitGraph::new(store, refs);
        Self {
            engine: SyncEngine::new(graph.clone()),
            graph,
            identity,
        }
    }

    fn tip(&self) -> Option<ObjectId> {
        self.graph.refs().read_ref(&branch_ref("main")).unwrap()
    }

    fn commit(&self, content: &str, ts: i64) -> ObjectId {
        let blob = self.graph.store().put_blob(content.as_bytes()).unwrap();
        let tree = self
            .graph
            .build_tree(&[StagedEntry::file("medical-history.json", blob)])
            .unwrap();
        let parents: Vec<ObjectId> = self.tip().into_iter().collect();
        self.graph
            .commit_on("main", tree, &parents, &self.identity, "update", ts)
            .unwrap()
    }
}

fn transport(base: &str, token: Option<&str>) -> HttpTransport {
    HttpTransport::from_remote_url(
        &format!("{base}/alice"),
        AuthMethod::from_token(token.map(str::to_string)),
    )
    .unwrap()
    .with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn push_then_pull_over_http() {
    let base = start_server(None).await;
    let identity = LocalIdentity::generate();
    let laptop = Client::new(identity.clone());
    let phone = Client::new(identity);

    laptop.commit("[]", 1);
    let second = laptop.commit("[{\"visit\":1}]", 2);

    let pushed = laptop
        .engine
        .push(&transport(&base, Some(TOKEN)), "origin", "main")
        .await
        .unwrap();
    assert_eq!(pushed.new_remote_ref, second);
    assert!(pushed.pushed_objects >= 4);
    assert_eq!(laptop.engine.sync_state("origin", "main").unwrap(), SyncState::Synced);

    let pulled = phone
        .engine
        .pull(&transport(&base, Some(TOKEN)), "origin", "main")
        .await
        .unwrap();
    assert_eq!(pulled.new_remote_ref, Some(second));
    assert!(matches!(pulled.merge_status, MergeStatus::FastForward { to, .. } if to == second));
    assert_eq!(phone.tip(), Some(second));
    assert!(phone.graph.verify_chain(&second).unwrap().valid);
}

#[tokio::test]
async fn racing_push_is_non_fast_forward() {
    let base = start_server(None).await;
    let identity = LocalIdentity::generate();
    let first = Client::new(identity.clone());
    let second = Client::new(identity);

    let winner = first.commit("[\"first\"]", 1);
    second.commit("[\"second\"]", 1);

    first
        .engine
        .push(&transport(&base, Some(TOKEN)), "origin", "main")
        .await
        .unwrap();
    let err = second
        .engine
        .push(&transport(&base, Some(TOKEN)), "origin", "main")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NonFastForward { .. }), "{err:?}");

    let refs = transport(&base, Some(TOKEN));
    let listed = mgit_sync::RemoteTransport::list_refs(&refs, "refs/heads/").await.unwrap();
    assert_eq!(listed, vec![("refs/heads/main".to_string(), winner)]);
}

#[tokio::test]
async fn missing_token_is_an_auth_error() {
    let base = start_server(None).await;
    let client = Client::new(LocalIdentity::generate());
    client.commit("[]", 1);

    let err = client
        .engine
        .push(&transport(&base, None), "origin", "main")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AuthError(_)), "{err:?}");

    let err = client
        .engine
        .push(&transport(&base, Some("wrong")), "origin", "main")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AuthError(_)), "{err:?}");
}

#[tokio::test]
async fn disk_backed_server_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_server(Some(dir.path().to_path_buf())).await;
    let client = Client::new(LocalIdentity::generate());
    let tip = client.commit("[]", 1);
    client
        .engine
        .push(&transport(&base, Some(TOKEN)), "origin", "main")
        .await
        .unwrap();

    // A fresh server over the same directory serves the same history.
    let base = start_server(Some(dir.path().to_path_buf())).await;
    let reader = Client::new(LocalIdentity::generate());
    let pulled = reader
        .engine
        .pull(&transport(&base, Some(TOKEN)), "origin", "main")
        .await
        .unwrap();
    assert_eq!(pulled.new_remote_ref, Some(tip));
    assert_eq!(reader.tip(), Some(tip));
}
