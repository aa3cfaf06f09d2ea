//! HTTP binding for the server-mediated flow.
use crate::config::Config;
use crate::error::PomoError;
use crate::models::{PlaylistDraft, PlaylistSummary, TrackSource};
use crate::session::SessionStore;
use crate::util;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
}

impl IntoResponse for PomoError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.requires_login() => StatusCode::UNAUTHORIZED,
            PomoError::NoCandidates | PomoError::NoDraft => StatusCode::BAD_REQUEST,
            PomoError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            PomoError::ApiRequest { status: Some(429), .. } => StatusCode::TOO_MANY_REQUESTS,
            PomoError::ApiRequest { .. } | PomoError::Transport(_) => StatusCode::BAD_GATEWAY,
            PomoError::Storage(_) | PomoError::Config(_) => {
                error!("internal error: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "login_required": self.requires_login(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, PomoError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session_id: String,
    pub auth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub source: TrackSource,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DraftResponse {
    pub draft: PlaylistDraft,
    pub total_duration_ms: u64,
    pub total_duration: String,
    pub track_count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    pub playlist_name: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/sessions/:id/playlists", get(playlists))
        .route("/sessions/:id/drafts", post(generate))
        .route("/sessions/:id/save", post(save))
        .route("/sessions/:id/logout", post(logout))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// GET /login
/// Start a session and return the provider URL the browser must visit
async fn login(State(state): State<AppState>) -> ApiResult<LoginResponse> {
    let session = state.sessions.create().await;
    let auth_url = session.login_url().await?;
    Ok(Json(LoginResponse {
        session_id: session.id().to_string(),
        auth_url,
    }))
}

/// GET /callback?code=..&state=<session id>
async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<serde_json::Value> {
    let session_id = params
        .state
        .ok_or_else(|| PomoError::UnknownSession("missing state".into()))?;
    let session = state.sessions.get(&session_id).await?;
    if let Some(err) = params.error {
        warn!("authorization denied for session {}: {}", session_id, err);
        return Err(PomoError::AuthExchange(err));
    }
    let code = params
        .code
        .ok_or_else(|| PomoError::AuthExchange("no code provided".into()))?;
    let user = session.complete_login(&code).await?;
    info!("session {} logged in as {}", session_id, user.id);
    Ok(Json(json!({ "session_id": session_id, "user_id": user.id })))
}

/// GET /sessions/:id/playlists
async fn playlists(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<PlaylistSummary>> {
    let session = state.sessions.get(&id).await?;
    Ok(Json(session.playlists().await?))
}

/// POST /sessions/:id/drafts
async fn generate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DraftRequest>,
) -> ApiResult<DraftResponse> {
    let session = state.sessions.get(&id).await?;
    let draft = session.generate(&req.source, req.duration_minutes).await?;
    let total = draft.total_duration_ms();
    Ok(Json(DraftResponse {
        total_duration_ms: total,
        total_duration: util::format_duration(total),
        track_count: draft.tracks.len(),
        draft,
    }))
}

/// POST /sessions/:id/save
async fn save(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SaveRequest>,
) -> ApiResult<serde_json::Value> {
    let session = state.sessions.get(&id).await?;
    let created = session.save(req.playlist_name.as_deref()).await?;
    Ok(Json(json!({
        "playlist_id": created.id,
        "playlist_url": created.url,
    })))
}

/// POST /sessions/:id/logout
async fn logout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.sessions.end(&id).await?;
    Ok(Json(json!({ "logged_out": true })))
}

pub async fn serve(cfg: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = cfg.server_addr.parse()?;
    let sessions = Arc::new(SessionStore::new(cfg.clone()));
    let sweeper = sessions.spawn_sweeper();
    let state = AppState { sessions };
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
