use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use docindex_core::persist::{load_index_dir, load_source_text, IndexPaths};
use docindex_core::snippet::snippet;
use docindex_core::{search, DocId, ObjectHit, SearchIndex, SearchOptions};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
    pub objects: Vec<ObjectHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: i32,
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct Section {
    pub title: String,
    pub anchor: Option<String>,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub docname: String,
    pub filename: String,
    pub title: String,
    pub url: String,
    pub sections: Vec<Section>,
    pub text: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub index_root: PathBuf,
    pub index: Arc<RwLock<Arc<SearchIndex>>>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn load(index_root: PathBuf, admin_token: Option<String>) -> Result<Self> {
        let index = load(&index_root)?;
        tracing::info!(num_docs = index.num_docs(), num_terms = index.terms.len(), "index loaded");
        Ok(Self { index_root, index: Arc::new(RwLock::new(Arc::new(index))), admin_token })
    }

    /// Snapshot of the live index; reloads never block on in-flight queries.
    fn current(&self) -> Arc<SearchIndex> {
        self.index.read().clone()
    }

    fn paths(&self) -> IndexPaths {
        IndexPaths::new(&self.index_root)
    }
}

fn load(index_root: &std::path::Path) -> Result<SearchIndex> {
    let (index, meta) = load_index_dir(index_root)?;
    if meta.is_none() {
        tracing::warn!(path = %index_root.display(), "index has no build metadata");
    }
    Ok(index)
}

/// CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
fn cors_from_env() -> CorsLayer {
    match std::env::var("CORS_ALLOW_ORIGIN") {
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
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(state)
        .layer(cors_from_env())
        .layer(TraceLayer::new_for_http())
}

/// Loads the index directory and wires the routes. Admin access comes from `ADMIN_TOKEN`.
pub fn build_app(index_dir: String) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState::load(PathBuf::from(index_dir), admin_token)?;
    Ok(router(state))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let index = state.current();
    let k = params.k.clamp(1, 100);
    let found = search(&index, &params.q, SearchOptions { limit: Some(k), objects: true });

    let paths = state.paths();
    let results = found
        .hits
        .into_iter()
        .map(|hit| {
            let excerpt = load_source_text(&paths, &hit.filename).and_then(|text| snippet(&text, &hit.matched));
            let url = match &hit.anchor {
                Some(anchor) => format!("{}#{}", hit.path, anchor),
                None => hit.path,
            };
            SearchHit { doc_id: hit.doc_id, score: hit.score, title: hit.plain_title, url, snippet: excerpt }
        })
        .collect();

    let elapsed = start.elapsed();
    Json(SearchResponse {
        query: params.q,
        took_s: elapsed.as_secs_f64(),
        total_hits: found.total_hits,
        results,
        objects: found.objects,
    })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocResponse>, (StatusCode, String)> {
    let index = state.current();
    let Some(doc) = index.document(doc_id) else {
        return Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found")));
    };
    let sections = index
        .sections_of(doc_id)
        .into_iter()
        .map(|(title, anchor)| Section { title: title.to_string(), anchor: anchor.map(str::to_string) })
        .collect();
    Ok(Json(DocResponse {
        doc_id,
        docname: doc.docname.to_string(),
        filename: doc.filename.to_string(),
        title: doc.plain_title(),
        url: doc.path(),
        sections,
        text: load_source_text(&state.paths(), doc.filename),
    }))
}

/// Re-reads the index directory and swaps the live index.
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let index = load(&state.index_root).map_err(|e| {
        tracing::warn!(error = %e, "reload failed");
        (StatusCode::UNPROCESSABLE_ENTITY, format!("reload failed: {e}"))
    })?;
    let num_docs = index.num_docs();
    *state.index.write() = Arc::new(index);
    tracing::info!(num_docs, "index reloaded");
    Ok(Json(serde_json::json!({ "reloaded": true, "num_docs": num_docs })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
