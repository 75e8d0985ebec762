use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use questboard_client::remote::{
    JsonBinStore, PrimaryStore, RemoteChain, RemoteStore, StaticFileStore,
};
use questboard_client::{default_quests, ClientError, LocalCache, SyncClient, PLACEHOLDER_QUEST_ID};
use questboard_engine::Engine;
use questboard_protocol::{
    Difficulty, ProgressEntry, ProgressMap, ProgressStatus, Quest, QuestDraft,
};
use questboard_server::{serve_listener, AppState, LOGIN_PAGE};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

const ADMIN: &str = "admin1234";
const UNREACHABLE: &str = "http://127.0.0.1:1";
const BIN_KEY: &str = "master-key";

fn temp_dir(tag: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "questboard-sync-{tag}-{}",
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    ));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn quest(id: &str, xp: u32) -> Quest {
    Quest {
        id: id.to_string(),
        title: format!("Quest {id}"),
        description: "Survive the night".to_string(),
        reward_item: "Bed".to_string(),
        reward_icon: "🛏️".to_string(),
        difficulty: Difficulty::Moyen,
        xp,
        active: true,
        extra: Default::default(),
    }
}

struct TestServer {
    url: String,
    engine: Engine,
}

/// A real store service seeded with `ids`, its public dir holding the seed.
async fn start_server(tag: &str, ids: &[&str]) -> TestServer {
    let dir = temp_dir(tag);
    let seed = dir.join("quests.json");
    let quests: Vec<Quest> = ids.iter().map(|id| quest(id, 100)).collect();
    std::fs::write(&seed, json!({ "quests": quests }).to_string()).unwrap();
    std::fs::write(dir.join(LOGIN_PAGE), "<html>login</html>").unwrap();

    let engine = Engine::in_dir(dir.join("data"), &seed);
    let state = AppState {
        engine: engine.clone(),
        public_dir: dir,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_listener(listener, state, std::future::pending()));
    TestServer {
        url: format!("http://{addr}"),
        engine,
    }
}

type Blob = Arc<Mutex<Value>>;

async fn bin_read(State(blob): State<Blob>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if headers.get("x-master-key").and_then(|v| v.to_str().ok()) != Some(BIN_KEY) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(blob.lock().unwrap().clone()))
}

async fn bin_write(
    State(blob): State<Blob>,
    Path(_bin): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if headers.get("x-master-key").and_then(|v| v.to_str().ok()) != Some(BIN_KEY) {
        return StatusCode::UNAUTHORIZED;
    }
    *blob.lock().unwrap() = body;
    StatusCode::OK
}

/// Minimal stand-in for the hosted JSON bin API.
async fn start_jsonbin(initial: Value) -> (String, Blob) {
    let blob: Blob = Arc::new(Mutex::new(initial));
    let app = Router::new()
        .route("/b/{bin}/latest", get(bin_read))
        .route("/b/{bin}", put(bin_write))
        .with_state(blob.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    (format!("http://{addr}/b"), blob)
}

fn jsonbin(base: &str) -> Box<dyn RemoteStore> {
    Box::new(JsonBinStore::with_client(reqwest::Client::new(), base, "bin1", BIN_KEY))
}

fn client(stores: Vec<Box<dyn RemoteStore>>) -> SyncClient {
    SyncClient::new(LocalCache::in_memory(), RemoteChain::new(stores), ADMIN)
}

fn primary_client(url: &str) -> SyncClient {
    client(vec![Box::new(PrimaryStore::new(url))])
}

fn ids(quests: &[Quest]) -> Vec<&str> {
    quests.iter().map(|q| q.id.as_str()).collect()
}

fn server_quests(server: &TestServer) -> Vec<Quest> {
    serde_json::from_value(Value::Array(server.engine.quests())).unwrap()
}

fn server_progress(server: &TestServer) -> ProgressMap {
    serde_json::from_value(Value::Object(server.engine.progress())).unwrap()
}

fn server_entry(server: &TestServer, player: &str, quest_id: &str) -> Option<ProgressEntry> {
    server_progress(server)
        .get(player)
        .and_then(|p| p.get(quest_id))
        .cloned()
}

#[tokio::test]
async fn primary_read_overwrites_cache() {
    let server = start_server("overwrite", &["q1", "q2"]).await;
    let sync = primary_client(&server.url);

    let mut stale = ProgressMap::new();
    stale
        .entry("Ghost".into())
        .or_default()
        .insert("q1".into(), ProgressEntry::pending(OffsetDateTime::now_utc()));
    sync.cache().save_all_progress(stale);
    sync.cache().set_known_players(vec!["Ghost".into()]);

    let quests = sync.load_quests().await;
    assert_eq!(ids(&quests), vec!["q1", "q2"]);
    assert_eq!(sync.cache().cached_quests(), Some(quests));
    assert!(sync.cache().all_progress().is_empty());
    assert!(sync.cache().known_players().is_empty());
}

#[tokio::test]
async fn fresh_cache_does_not_skip_the_primary() {
    let server = start_server("fresh", &["q1", "q2"]).await;
    let sync = primary_client(&server.url);

    sync.cache().set_cached_quests(vec![quest("q_stale", 1)]);
    assert!(sync.cache().is_cache_valid());

    let quests = sync.load_quests().await;
    assert_eq!(ids(&quests), vec!["q1", "q2"]);
    assert_eq!(
        sync.cache().cached_quests().as_deref().map(ids),
        Some(vec!["q1", "q2"])
    );
}

#[tokio::test]
async fn falls_back_to_jsonbin_when_primary_is_down() {
    let (bin, _) = start_jsonbin(json!({ "quests": [quest("q_bin", 10)], "players": ["Alex"] })).await;
    let sync = client(vec![Box::new(PrimaryStore::new(UNREACHABLE)), jsonbin(&bin)]);

    let quests = sync.load_quests().await;
    assert_eq!(ids(&quests), vec!["q_bin"]);
    assert_eq!(sync.cache().known_players(), vec!["Alex".to_string()]);
}

#[tokio::test]
async fn answer_without_quests_falls_through_to_static_file() {
    let server = start_server("static", &["q_static"]).await;
    let (bin, _) = start_jsonbin(json!({ "progress": {} })).await;
    let sync = client(vec![
        Box::new(PrimaryStore::new(UNREACHABLE)),
        jsonbin(&bin),
        Box::new(StaticFileStore::new(server.url.clone())),
    ]);

    let quests = sync.load_quests().await;
    assert_eq!(ids(&quests), vec!["q_static"]);
    assert_eq!(sync.cache().cached_quests().map(|q| q.len()), Some(1));
}

#[tokio::test]
async fn offline_uses_cache_then_placeholder() {
    let sync = client(vec![
        Box::new(PrimaryStore::new(UNREACHABLE)),
        jsonbin(&format!("{UNREACHABLE}/b")),
        Box::new(StaticFileStore::new(UNREACHABLE)),
    ]);

    let quests = sync.load_quests().await;
    assert_eq!(quests, default_quests());
    assert_eq!(quests[0].id, PLACEHOLDER_QUEST_ID);
    assert_eq!(quests[0].xp, 0);

    sync.cache().set_cached_quests(vec![quest("q_cached", 5)]);
    assert_eq!(ids(&sync.load_quests().await), vec!["q_cached"]);
}

#[tokio::test]
async fn login_registers_player_once() {
    let server = start_server("login", &["q1"]).await;
    let sync = primary_client(&server.url);

    let player = sync.login("  Steve ").await.unwrap();
    assert_eq!(player.name, "Steve");
    assert_eq!(sync.current_player().map(|p| p.name), Some("Steve".into()));

    sync.logout();
    sync.login("Steve").await.unwrap();
    assert_eq!(server.engine.players(), vec!["Steve".to_string()]);
    assert_eq!(sync.cache().known_players(), vec!["Steve".to_string()]);

    let err = sync.login("a").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidName(_)));
    let err = sync.login("bad name!").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidName(_)));
}

#[tokio::test]
async fn mark_done_patches_the_server() {
    let server = start_server("mark", &["q1", "q2"]).await;
    let sync = primary_client(&server.url);

    let err = sync.mark_quest_done("q1").await.unwrap_err();
    assert!(matches!(err, ClientError::NotLoggedIn));

    sync.login("Steve").await.unwrap();
    let entry = sync.mark_quest_done("q1").await.unwrap().unwrap();
    assert_eq!(entry.status, ProgressStatus::Pending);
    assert!(entry.requested_at.is_some());

    assert_eq!(server_entry(&server, "Steve", "q1"), Some(entry.clone()));
    assert_eq!(server_entry(&server, "Steve", "q2"), None);

    // Already pending: nothing changes.
    assert_eq!(sync.mark_quest_done("q1").await.unwrap(), None);
    assert_eq!(server_entry(&server, "Steve", "q1"), Some(entry));
}

#[tokio::test]
async fn admin_validates_and_rejects() {
    let server = start_server("admin", &["q1", "q2"]).await;

    let steve = primary_client(&server.url);
    steve.login("Steve").await.unwrap();
    steve.mark_quest_done("q1").await.unwrap();
    let alex = primary_client(&server.url);
    alex.login("Alex").await.unwrap();
    alex.mark_quest_done("q2").await.unwrap();

    let admin = primary_client(&server.url);
    assert!(matches!(
        admin.validate("Steve", "q1").await.unwrap_err(),
        ClientError::AdminLocked
    ));
    assert!(!admin.admin_login("nope"));
    assert!(!admin.is_admin());
    assert!(admin.admin_login(ADMIN));

    let dashboard = admin.load_admin_dashboard().await.unwrap();
    assert_eq!(dashboard.total_pending(), 2);
    assert_eq!(dashboard.players.len(), 2);

    let requested = server_entry(&server, "Steve", "q1").unwrap().requested_at;
    let validated = admin.validate("Steve", "q1").await.unwrap().unwrap();
    assert_eq!(validated.status, ProgressStatus::Validated);
    assert_eq!(validated.requested_at, requested);
    assert_eq!(server_entry(&server, "Steve", "q1"), Some(validated));

    // Only pending entries can be decided.
    assert_eq!(admin.reject("Steve", "q1").await.unwrap(), None);

    let rejected = admin.reject("Alex", "q2").await.unwrap().unwrap();
    assert_eq!(rejected, ProgressEntry::available());
    assert_eq!(
        server_entry(&server, "Alex", "q2").map(|e| e.status),
        Some(ProgressStatus::Available)
    );

    let dashboard = admin.load_admin_dashboard().await.unwrap();
    assert_eq!(dashboard.total_pending(), 0);
    assert_eq!(dashboard.total_validated, 1);

    admin.admin_logout();
    assert!(matches!(
        admin.load_admin_dashboard().await.unwrap_err(),
        ClientError::AdminLocked
    ));
}

#[tokio::test]
async fn player_board_reflects_validation() {
    let server = start_server("board", &["q1", "q2"]).await;
    let sync = primary_client(&server.url);
    assert!(matches!(
        sync.player_board().await.unwrap_err(),
        ClientError::NotLoggedIn
    ));

    sync.login("Steve").await.unwrap();
    sync.mark_quest_done("q1").await.unwrap();
    assert!(sync.admin_login(ADMIN));
    sync.validate("Steve", "q1").await.unwrap();

    let board = sync.player_board().await.unwrap();
    assert_eq!(board.player(), "Steve");
    assert_eq!(board.status("q1"), ProgressStatus::Validated);
    let stats = board.stats();
    assert_eq!((stats.active, stats.validated, stats.xp), (2, 1, 100));
}

#[tokio::test]
async fn primary_writes_send_the_whole_cache() {
    let server = start_server("full", &["q1"]).await;

    // Nothing cached yet: quests must not be blanked on the server.
    let fresh = primary_client(&server.url);
    fresh.cache().add_known_player("Alex");
    let mut progress = ProgressMap::new();
    progress
        .entry("Alex".into())
        .or_default()
        .insert("q1".into(), ProgressEntry::pending(OffsetDateTime::now_utc()));
    fresh.save_progress(progress.clone()).await;

    assert_eq!(ids(&server_quests(&server)), vec!["q1"]);
    assert_eq!(server_progress(&server), progress);
    assert_eq!(server.engine.players(), vec!["Alex".to_string()]);

    fresh
        .save_quests(vec![quest("q1", 100), quest("q9", 900)])
        .await;
    assert_eq!(ids(&server_quests(&server)), vec!["q1", "q9"]);
    assert_eq!(server_progress(&server), progress);
}

#[tokio::test]
async fn jsonbin_writes_keep_other_fields() {
    let (bin, blob) = start_jsonbin(json!({
        "quests": [quest("q1", 100)],
        "players": ["Steve"],
        "motd": "hello"
    }))
    .await;
    let sync = client(vec![jsonbin(&bin)]);

    sync.login("Steve").await.unwrap();
    sync.load_quests().await;
    let entry = sync.mark_quest_done("q1").await.unwrap().unwrap();

    let stored = blob.lock().unwrap().clone();
    assert_eq!(stored["motd"], "hello");
    assert_eq!(stored["players"], json!(["Steve"]));
    assert_eq!(stored["quests"][0]["id"], "q1");
    assert_eq!(
        stored["progress"]["Steve"]["q1"],
        serde_json::to_value(&entry).unwrap()
    );
}

#[tokio::test]
async fn admin_manages_quests() {
    let server = start_server("quests", &["q1"]).await;
    let sync = primary_client(&server.url);
    assert!(sync.admin_login(ADMIN));

    let added = sync
        .add_quest(QuestDraft {
            title: "Kill the dragon".into(),
            description: "In the End".into(),
            reward_item: "Elytra".into(),
            difficulty: Difficulty::Legendaire,
            ..QuestDraft::default()
        })
        .await
        .unwrap();
    assert!(added.id.starts_with("q_"));
    assert_eq!(added.xp, 100);
    assert_eq!(added.reward_icon, "⭐");
    assert_eq!(ids(&server_quests(&server)), vec!["q1", added.id.as_str()]);

    let err = sync.add_quest(QuestDraft::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidDraft(_)));

    assert!(!sync.toggle_quest_active("q1").await.unwrap());
    assert!(!server_quests(&server)[0].active);
    assert!(sync.toggle_quest_active("q1").await.unwrap());

    sync.delete_quest(&added.id).await.unwrap();
    assert_eq!(ids(&server_quests(&server)), vec!["q1"]);

    assert!(matches!(
        sync.delete_quest("missing").await.unwrap_err(),
        ClientError::UnknownQuest(_)
    ));
    assert!(matches!(
        sync.toggle_quest_active("missing").await.unwrap_err(),
        ClientError::UnknownQuest(_)
    ));
}

#[tokio::test]
async fn changes_survive_in_the_cache_file() {
    let dir = temp_dir("cachefile");
    let path = dir.join("cache.json");
    let sync = SyncClient::new(
        LocalCache::open(&path),
        RemoteChain::new(vec![Box::new(PrimaryStore::new(UNREACHABLE))]),
        ADMIN,
    );
    sync.login("Steve").await.unwrap();
    sync.save_quests(vec![quest("q1", 100)]).await;
    sync.mark_quest_done("q1").await.unwrap();

    let reopened = LocalCache::open(&path);
    assert_eq!(reopened.cached_quests().map(|q| q.len()), Some(1));
    assert_eq!(
        reopened.player_progress("Steve")["q1"].status,
        ProgressStatus::Pending
    );
    // Session state is not durable.
    assert!(reopened.current_player().is_none());
}
