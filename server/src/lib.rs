pub mod completion;

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use completion::CompletionService;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tutor_core::persist::IndexPaths;
use tutor_core::prompt::DEFAULT_CONTEXT_BUDGET;
use tutor_core::{CorpusRecord, CorpusSource, RetrievalError, RetrievalService};

const MAX_K: i64 = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: i64,
}
fn default_k() -> i64 { 5 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub description: String,
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub k: Option<i64>,
}

#[derive(Serialize)]
pub struct AskResponse {
    /// Absent when no completion service is configured.
    pub answer: Option<String>,
    pub prompt: String,
    pub sources: Vec<String>,
    pub truncated: bool,
}

/// Everything the process entry point decides before serving.
pub struct ServerConfig {
    pub index_dir: PathBuf,
    pub corpus: Option<Arc<dyn CorpusSource>>,
    pub completion: Option<Arc<dyn CompletionService>>,
    pub context_budget: usize,
    pub admin_token: Option<String>,
}

impl ServerConfig {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            corpus: None,
            completion: None,
            context_budget: DEFAULT_CONTEXT_BUDGET,
            admin_token: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub retrieval: Arc<RetrievalService>,
    pub index_paths_root: PathBuf,
    pub corpus: Option<Arc<dyn CorpusSource>>,
    pub completion: Option<Arc<dyn CompletionService>>,
    pub context_budget: usize,
    pub admin_token: Option<String>,
}

type ApiError = (StatusCode, String);

pub fn build_app(config: ServerConfig) -> Result<Router> {
    // A missing or corrupt model is fatal: never serve without an index.
    let index_paths = IndexPaths::new(&config.index_dir);
    let retrieval = Arc::new(RetrievalService::load(&index_paths)?);
    let app_state = AppState {
        retrieval,
        index_paths_root: config.index_dir,
        corpus: config.corpus,
        completion: config.completion,
        context_budget: config.context_budget,
        admin_token: config.admin_token,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/record/:id", get(record_handler))
        .route("/ask", post(ask_handler))
        .route("/admin/refresh", post(refresh_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

fn error_response(err: RetrievalError) -> ApiError {
    match err {
        RetrievalError::InvalidK(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Reject k <= 0, cap large values.
fn checked_k(k: i64) -> Result<usize, ApiError> {
    if k <= 0 {
        return Err(error_response(RetrievalError::InvalidK(k)));
    }
    Ok(k.min(MAX_K) as usize)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let hits = state.retrieval.search(&params.q, params.k.min(MAX_K)).map_err(error_response)?;
    let results = hits
        .into_iter()
        .map(|h| SearchHit { id: h.record.id, score: h.score, description: h.record.description, metadata: h.record.metadata })
        .collect();
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), results }))
}

pub async fn record_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<CorpusRecord>, ApiError> {
    let index = state.retrieval.snapshot();
    match index.record(&id) {
        Some(record) => Ok(Json(record.clone())),
        None => Err((StatusCode::NOT_FOUND, format!("no record with id {id:?}"))),
    }
}

pub async fn ask_handler(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Result<Json<AskResponse>, ApiError> {
    let k = checked_k(req.k.unwrap_or_else(default_k))?;
    let prompt = state
        .retrieval
        .prompt(&req.question, k, state.context_budget)
        .map_err(error_response)?;
    if prompt.sources.is_empty() {
        tracing::debug!("no course material matched the question");
    }

    let answer = match &state.completion {
        Some(service) => match service.complete(&prompt.text).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "completion failed");
                return Err((StatusCode::BAD_GATEWAY, format!("completion failed: {e}")));
            }
        },
        None => None,
    };
    Ok(Json(AskResponse { answer, prompt: prompt.text, sources: prompt.sources, truncated: prompt.truncated }))
}

async fn refresh_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    let Some(source) = state.corpus.clone() else {
        return Err((StatusCode::CONFLICT, "no corpus source configured".into()));
    };
    let retrieval = state.retrieval.clone();
    let paths = IndexPaths::new(&state.index_paths_root);
    let refreshed = tokio::task::spawn_blocking(move || retrieval.refresh(&*source, Some(&paths)))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match refreshed {
        Ok(index) => Ok(Json(serde_json::json!({ "records": index.len(), "dimension": index.dimension() }))),
        Err(e) => {
            tracing::error!(error = %e, "refresh failed, keeping the active index");
            Err(error_response(e))
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        tracing::warn!("rejected admin request with an invalid token");
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
