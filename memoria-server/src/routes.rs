//! HTTP surface: episode ingestion, retrieval, and graph export.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use memoria::edges::EntityEdge;
use memoria::embedder::openai::OpenAiEmbedder;
use memoria::llm_client::openai::OpenAiClient;
use memoria::nodes::{EntityNode, EpisodeType};
use memoria::pipeline::AddEpisodeParams;
use memoria::search::SearchResult;
use memoria::storage::{GraphStorage, PostgresStorage};
use memoria::{MemoriaError, MemoryGraph};

/// Production engine wiring shared by every handler.
pub type Engine = MemoryGraph<OpenAiClient, OpenAiEmbedder, PostgresStorage>;

#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<Engine>,
    pub storage: Arc<PostgresStorage>,
}

/// Build the application router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/episodes", post(add_episode_handler))
        .route("/search", get(search_handler))
        .route("/graph", get(graph_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Engine error carried out of a handler and mapped onto an HTTP response.
#[derive(Debug)]
struct ApiError(MemoriaError);

impl From<MemoriaError> for ApiError {
    fn from(error: MemoriaError) -> Self {
        ApiError(error)
    }
}

fn error_status(error: &MemoriaError) -> StatusCode {
    match error {
        MemoriaError::Validation(_) => StatusCode::BAD_REQUEST,
        MemoriaError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        MemoriaError::Llm(_) | MemoriaError::Embedder(_) => StatusCode::BAD_GATEWAY,
        MemoriaError::Storage(_) | MemoriaError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ─── Episode ingestion ────────────────────────────────────────────────────────

/// Body of `POST /episodes`.
///
/// Required fields are optional at the serde level so a missing field yields
/// a 400 with a message naming it, not a deserialization rejection.
#[derive(Debug, Deserialize)]
struct EpisodeRequest {
    /// Short human-readable episode name.
    name: Option<String>,
    /// Tenant the episode belongs to.
    group_id: Option<String>,
    /// Raw episode payload handed to extraction.
    content: Option<String>,
    /// Provenance note, e.g. "user chat message".
    description: Option<String>,
    /// Free-form tags stored with the episode.
    #[serde(default)]
    labels: Vec<String>,
    /// Episode kind: "message" (default), "json", or "text".
    #[serde(rename = "type")]
    source: Option<String>,
    /// Re-ingest (upsert) an existing episode.
    uuid: Option<Uuid>,
}

impl EpisodeRequest {
    fn into_params(self) -> Result<AddEpisodeParams, MemoriaError> {
        let mut missing = Vec::new();
        for (field, value) in [
            ("name", &self.name),
            ("group_id", &self.group_id),
            ("content", &self.content),
            ("description", &self.description),
        ] {
            if value.is_none() {
                missing.push(field);
            }
        }
        if !missing.is_empty() {
            return Err(MemoriaError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let source = match self.source.as_deref() {
            None => EpisodeType::Message,
            Some(value) => EpisodeType::parse(value).ok_or_else(|| {
                MemoriaError::Validation(format!("unknown episode type '{}'", value))
            })?,
        };

        // Presence was checked above; blank-content checks happen in the engine.
        let mut params = AddEpisodeParams::new(
            self.name.unwrap_or_default(),
            self.group_id.unwrap_or_default(),
            self.content.unwrap_or_default(),
            self.description.unwrap_or_default(),
        );
        params.source = source;
        params.labels = self.labels;
        params.uuid = self.uuid;
        Ok(params)
    }
}

#[derive(Debug, Serialize)]
struct EpisodeAccepted {
    uuid: Uuid,
}

/// `POST /episodes`: record an episode and start its enrichment.
///
/// Returns 202 once the episode is durable; extraction, resolution, and
/// commit continue in the background.
async fn add_episode_handler(
    State(state): State<AppState>,
    Json(request): Json<EpisodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let params = request.into_params()?;
    let handle = state.memory.add_episode(params).await?;
    // Dropping the handle detaches the enrichment task.
    Ok((
        StatusCode::ACCEPTED,
        Json(EpisodeAccepted {
            uuid: handle.episode_uuid(),
        }),
    ))
}

// ─── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    group_id: Option<String>,
    top_k: Option<usize>,
}

/// `GET /search?q=&group_id=&top_k=`: ranked facts plus rendered context.
#[derive(Debug, Serialize)]
struct SearchResponse {
    context: String,
    #[serde(flatten)]
    result: SearchResult,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = require_param("q", params.q)?;
    let group_id = require_param("group_id", params.group_id)?;

    let result = state.memory.search(&query, &group_id, params.top_k).await?;
    Ok(Json(SearchResponse {
        context: result.context(),
        result,
    }))
}

fn require_param(name: &str, value: Option<String>) -> Result<String, MemoriaError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MemoriaError::Validation(format!(
            "query parameter '{}' is required",
            name
        ))),
    }
}

// ─── Graph export ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphParams {
    group_id: Option<String>,
}

/// `GET /graph?group_id=`: a tenant's full committed node and edge sets.
#[derive(Debug, Serialize)]
struct GraphResponse {
    group_id: String,
    nodes: Vec<EntityNode>,
    edges: Vec<EntityEdge>,
}

async fn graph_handler(
    State(state): State<AppState>,
    Query(params): Query<GraphParams>,
) -> Result<Json<GraphResponse>, ApiError> {
    let group_id = require_param("group_id", params.group_id)?;

    let graph = state.memory.graph(&group_id).await?;
    let mut nodes: Vec<EntityNode> = graph.nodes().cloned().collect();
    // The node map is unordered; sort for a stable response.
    nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

    Ok(Json(GraphResponse {
        group_id,
        nodes,
        edges: graph.edges().to_vec(),
    }))
}

// ─── Probes ───────────────────────────────────────────────────────────────────

/// Liveness: 200 while the process runs.
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness: 200 once the database answers a ping.
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
