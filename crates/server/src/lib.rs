use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use questboard_engine::{Document, DocumentPatch, Engine};
use questboard_protocol::{Ack, ErrorBody};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;

mod config;


pub use config::ServerConfig;

pub const LOGIN_PAGE: &str = "login.html";

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub public_dir: PathBuf,
}

type Shared = State<Arc<AppState>>;

pub fn build_router(state: AppState) -> Router {
    let site = static_site(&state.public_dir);
    Router::new()
        .route("/health", get(health))
        .route("/api/data", get(get_data).put(put_data))
        .route("/api/quests", get(get_quests).put(put_quests))
        .route("/api/progress", get(get_progress).put(put_progress))
        .route("/api/progress/{player}/{quest_id}", patch(patch_progress))
        .route("/api/players", get(get_players).post(register_player))
        .fallback_service(site)
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        // Pages are served from the same origin, but a client may also be
        // pointed at this store from elsewhere.
        .layer(open_cors())
}

async fn health() -> &'static str {
    "ok"
}

async fn get_data(State(state): Shared) -> Json<Document> {
    Json(state.engine.snapshot())
}

async fn put_data(State(state): Shared, Json(patch): Json<DocumentPatch>) -> Json<Ack> {
    state.engine.apply(patch);
    Json(Ack::ok())
}

async fn get_quests(State(state): Shared) -> Json<Vec<Value>> {
    Json(state.engine.quests())
}

async fn put_quests(State(state): Shared, Json(quests): Json<Vec<Value>>) -> Json<Ack> {
    state.engine.replace_quests(quests);
    Json(Ack::ok())
}

async fn get_progress(State(state): Shared) -> Json<Map<String, Value>> {
    Json(state.engine.progress())
}

async fn put_progress(State(state): Shared, Json(progress): Json<Map<String, Value>>) -> Json<Ack> {
    state.engine.replace_progress(progress);
    Json(Ack::ok())
}

async fn patch_progress(
    State(state): Shared,
    Path((player, quest_id)): Path<(String, String)>,
    Json(entry): Json<Value>,
) -> Json<Ack> {
    state.engine.set_progress_entry(&player, &quest_id, entry);
    Json(Ack::ok())
}

async fn get_players(State(state): Shared) -> Json<Vec<String>> {
    Json(state.engine.players())
}

async fn register_player(
    State(state): Shared,
    Json(body): Json<Value>,
) -> Response {
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let Some(name) = name else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "name is required".to_string(),
            }),
        )
            .into_response();
    };
    state.engine.register_player(name);
    Json(Ack::ok()).into_response()
}

/// Files from the public directory, with the login page for everything else.
fn static_site(public_dir: &std::path::Path) -> SetResponseHeader<ServeDir<ServeFile>, HeaderValue> {
    let login = ServeFile::new(public_dir.join(LOGIN_PAGE));
    SetResponseHeader::if_not_present(
        ServeDir::new(public_dir).fallback(login),
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    )
}

fn open_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::PATCH, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::any())
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, state, shutdown_signal()).await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);
    let addr = listener.local_addr()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(addr)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
