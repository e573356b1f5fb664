use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use boolrank_core::query::{parse_clauses, resolve_total_documents};
use boolrank_core::store::{load_from_path, load_meta, IndexPaths};
use boolrank_core::{DocId, EnglishNormalizer, Hit, InvertedIndex, IrError, Normalizer, QueryEngine, RetrievalMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    /// Clauses separated by newlines or `|`; terms within a clause are ANDed.
    pub q: String,
    #[serde(default)]
    pub mode: RetrievalMode,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: RetrievalMode,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<Hit>,
}

#[derive(Serialize)]
pub struct TermResponse {
    pub term: String,
    pub df: u32,
    pub postings: BTreeMap<DocId, u32>,
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<InvertedIndex>,
    pub normalizer: EnglishNormalizer,
    pub total_documents: u32,
}

/// Load the index once at startup and serve it read-only.
pub fn build_app(index_path: &str, total_docs: Option<u32>) -> Result<Router> {
    let paths = IndexPaths::new(index_path);
    let index = load_from_path(&paths).with_context(|| format!("loading index {index_path}"))?;
    let meta = load_meta(&paths)?;
    let total_documents = resolve_total_documents(total_docs, meta.as_ref(), &index);
    tracing::info!(num_terms = index.len(), total_documents, "index ready");
    let normalizer = meta.as_ref().map_or_else(EnglishNormalizer::new, |m| EnglishNormalizer::with_min_len(m.min_term_len));
    let state = AppState { index: Arc::new(index), normalizer, total_documents };
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/term/:term", get(term_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let lines: Vec<&str> = params.q.split(['\n', '|']).collect();
    let clauses = parse_clauses(&state.normalizer, &lines);
    let num_clauses = clauses.len();
    let mode = params.mode;
    // Clause evaluation fans out on rayon; keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || {
        QueryEngine::new(&state.index, mode, state.total_documents).search(&clauses)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(internal)?;

    let total_hits = result.len();
    let k = params.k.clamp(1, 1000);
    let results: Vec<Hit> = result.hits().iter().take(k).copied().collect();
    let elapsed = start.elapsed();
    tracing::debug!(clauses = num_clauses, total_hits, "search served");
    Ok(Json(SearchResponse { query: params.q, mode: params.mode, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn term_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<TermResponse>, (StatusCode, String)> {
    let Some(term) = state.normalizer.normalize_token(&raw) else {
        return Err((StatusCode::NOT_FOUND, format!("{raw:?} is not an indexable term")));
    };
    match state.index.get(&term) {
        Some(entry) => Ok(Json(TermResponse { df: entry.document_frequency(), postings: entry.postings().clone(), term })),
        None => Err((StatusCode::NOT_FOUND, format!("term {term:?} not in index"))),
    }
}

fn internal(err: IrError) -> (StatusCode, String) {
    tracing::error!(error = %err, "query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
