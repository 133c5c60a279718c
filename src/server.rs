//! HTTP API server.
//!
//! Exposes the topic feed, interactions, ingestion triggers, note indexing,
//! note search, knowledge stats and the RAG chat as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/topics/daily` | Ranked, skip-filtered feed for the caller |
//! | `POST` | `/topics/interaction` | Record `viewed` / `saved` / `skipped` |
//! | `POST` | `/topics/refresh` | Run one ingestion cycle |
//! | `GET`  | `/cron/fetch-topics` | Scheduled ingestion (bearer secret) |
//! | `POST` | `/topics/save-as-note` | Copy a topic into a tagged note |
//! | `POST` | `/notes` | Create a note |
//! | `POST` | `/notes/{id}/embed` | Rebuild a note's chunk embeddings |
//! | `POST` | `/search` | `#tag` or semantic note search |
//! | `POST` | `/chat` | Answer from the caller's notes |
//! | `POST` | `/chat/sessions` | Start a persisted chat session |
//! | `GET`  | `/chat/history?sessionId=` | Stored messages of a session |
//! | `DELETE` | `/chat/sessions/{id}` | Delete a session and its messages |
//! | `GET`  | `/knowledge/stats` | Tag distribution and note counts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The caller is identified by the `x-user-id` header; every endpoint except
//! `/health` and `/cron/fetch-topics` answers `401` without it.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `embedding_failed` (500), `internal` (500),
//! `embeddings_unavailable` (503).

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use notefeed_core::completion::ChatMessage;
use notefeed_core::ranking::drop_skipped;
use notefeed_core::{
    Action, KnowledgeStats, Note, NoteError, NoteMatch, RankedTopic, StoreError,
};

use crate::config::{Config, Secrets};
use crate::ingest::{fetch_and_store_topics, IngestReport};
use crate::services::Services;

pub const USER_HEADER: &str = "x-user-id";

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config, secrets: &Secrets) -> anyhow::Result<()> {
    let services = Arc::new(Services::open(config, secrets).await?);
    let app = router(services);

    let bind_addr = &config.server.bind;
    println!("notefeed listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/topics/daily", get(handle_daily_topics))
        .route("/topics/interaction", post(handle_interaction))
        .route("/topics/refresh", post(handle_refresh))
        .route("/topics/save-as-note", post(handle_save_as_note))
        .route("/cron/fetch-topics", get(handle_cron_fetch))
        .route("/notes", post(handle_create_note))
        .route("/notes/{id}/embed", post(handle_embed_note))
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .route("/chat/sessions", post(handle_create_session))
        .route("/chat/sessions/{id}", delete(handle_delete_session))
        .route("/chat/history", get(handle_chat_history))
        .route("/knowledge/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    app_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => {
                app_error(StatusCode::NOT_FOUND, "not_found", format!("{} not found", what))
            }
            StoreError::UniqueViolation(what) => {
                app_error(StatusCode::CONFLICT, "conflict", what)
            }
            StoreError::Backend(e) => {
                tracing::error!(error = %e, "store failure");
                internal(e.to_string())
            }
        }
    }
}

impl From<NoteError> for AppError {
    fn from(err: NoteError) -> Self {
        match err {
            NoteError::EmbeddingsUnavailable => app_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "embeddings_unavailable",
                "embedding service unavailable",
            ),
            NoteError::EmbeddingFailed => app_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "embedding_failed",
                "failed to generate embedding",
            ),
            NoteError::Store(e) => e.into(),
        }
    }
}

// ============ Caller identity ============

/// The caller's user id, taken from the `x-user-id` header.
struct UserId(String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| unauthorized(format!("missing {} header", USER_HEADER)))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Topics ============

#[derive(Serialize)]
struct FeedResponse {
    topics: Vec<RankedTopic>,
}

async fn handle_daily_topics(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
) -> Result<Json<FeedResponse>, AppError> {
    let feed = services
        .ranker
        .rank(
            &user,
            Duration::hours(services.feed.window_hours),
            services.feed.limit,
            Utc::now(),
        )
        .await?;
    Ok(Json(FeedResponse {
        topics: drop_skipped(feed),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InteractionRequest {
    topic_id: String,
    action: String,
}

#[derive(Serialize)]
struct InteractionResponse {
    success: bool,
    created: bool,
}

async fn handle_interaction(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Json(req): Json<InteractionRequest>,
) -> Result<Json<InteractionResponse>, AppError> {
    if req.topic_id.trim().is_empty() {
        return Err(bad_request("topicId must not be empty"));
    }
    let action: Action = req.action.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?;
    let created = services.ledger.record(&user, &req.topic_id, action).await?;
    Ok(Json(InteractionResponse {
        success: true,
        created,
    }))
}

async fn handle_refresh(
    State(services): State<Arc<Services>>,
    UserId(_user): UserId,
) -> Json<IngestReport> {
    Json(run_cycle(&services).await)
}

async fn handle_cron_fetch(
    State(services): State<Arc<Services>>,
    headers: HeaderMap,
) -> Result<Json<IngestReport>, AppError> {
    if let Some(secret) = &services.cron_secret {
        let expected = format!("Bearer {}", secret);
        let given = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return Err(unauthorized("invalid cron secret"));
        }
    }
    Ok(Json(run_cycle(&services).await))
}

async fn run_cycle(services: &Services) -> IngestReport {
    fetch_and_store_topics(&services.registry, &services.upserter, &services.sweeper).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveAsNoteRequest {
    topic_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveAsNoteResponse {
    success: bool,
    note_id: String,
}

async fn handle_save_as_note(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Json(req): Json<SaveAsNoteRequest>,
) -> Result<Json<SaveAsNoteResponse>, AppError> {
    if req.topic_id.trim().is_empty() {
        return Err(bad_request("topicId must not be empty"));
    }
    let note = services.notes.save_topic(&user, &req.topic_id).await?;
    Ok(Json(SaveAsNoteResponse {
        success: true,
        note_id: note.id,
    }))
}

// ============ Notes ============

#[derive(Deserialize)]
struct CreateNoteRequest {
    #[serde(default)]
    title: Option<String>,
    content: String,
}

#[derive(Serialize)]
struct NoteResponse {
    note: Note,
}

async fn handle_create_note(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<NoteResponse>), AppError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    let title = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let note = services.notes.create_note(&user, title, &req.content).await?;
    Ok((StatusCode::CREATED, Json(NoteResponse { note })))
}

#[derive(Serialize)]
struct EmbedResponse {
    success: bool,
    chunks: usize,
}

async fn handle_embed_note(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<EmbedResponse>, AppError> {
    let chunks = services.notes.index_note(&user, &id).await?;
    Ok(Json(EmbedResponse {
        success: true,
        chunks,
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<NoteMatch>,
}

async fn handle_search(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let results = services.notes.search(&user, query).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
    /// When set, history comes from the stored session and both turns are
    /// appended to it; `history` is ignored.
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    message: String,
}

async fn handle_chat(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let message = match req.session_id.as_deref() {
        Some(session_id) => services.sessions.send(&user, session_id, &req.message).await?,
        None => services.chat.answer(&user, &req.message, &req.history).await,
    };
    Ok(Json(ChatResponse { message }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionCreated {
    session_id: String,
}

async fn handle_create_session(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let session = services.sessions.create(&user).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_chat_history(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let session_id = query
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("sessionId is required"))?;
    let messages = services.sessions.history(&user, &session_id).await?;
    Ok(Json(HistoryResponse { messages }))
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn handle_delete_session(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !services.sessions.delete(&user, &id).await? {
        return Err(StoreError::NotFound(format!("chat session {}", id)).into());
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn handle_stats(
    State(services): State<Arc<Services>>,
    UserId(user): UserId,
) -> Result<Json<KnowledgeStats>, AppError> {
    Ok(Json(services.stats.collect(&user).await?))
}
