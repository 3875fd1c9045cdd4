use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::error::AppError;
use crate::export::listings_csv;
use crate::pipeline::Pipeline;
use crate::types::{Listing, ListingFilter, RefreshResult};

const RECENT_DEFAULT_LIMIT: i64 = 20;
const RECENT_MAX_LIMIT: i64 = 100;
const SEARCH_DEFAULT_LIMIT: i64 = 25;
const SEARCH_MAX_LIMIT: i64 = 100;
const SEARCH_MIN_QUERY_CHARS: usize = 2;
const EXPORT_DEFAULT_LIMIT: i64 = 200;
const EXPORT_MAX_LIMIT: i64 = 5000;

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/listing/:id/refresh_comps", post(refresh_comps))
        .route("/listing/:id/note", post(set_note))
        .route("/recent", get(get_recent))
        .route("/search", get(search))
        .route("/export.csv", get(export_csv))
        .route("/labels", get(get_labels))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub notify: bool,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
    pub label: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
    pub label: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Deserialize)]
pub struct NoteQuery {
    pub label: Option<String>,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RowsResponse {
    pub rows: Vec<Listing>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub rows: Vec<Listing>,
    pub query: String,
}

#[derive(Serialize)]
pub struct NoteResponse {
    pub ok: bool,
    pub id: i64,
    pub label: Option<String>,
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Serialize)]
pub struct LabelsResponse {
    pub counts: Vec<LabelCount>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub listings_total: i64,
    pub listings_processed: u64,
    pub empty_comp_summaries: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub last_refresh_at_ns: Option<u64>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

fn price_bound(name: &str, value: Option<f64>) -> Result<Option<f64>, AppError> {
    match value {
        Some(v) if v < 0.0 || !v.is_finite() => Err(AppError::BadRequest(format!(
            "{name} must be a non-negative number"
        ))),
        other => Ok(other),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn refresh_comps(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<RefreshQuery>,
) -> Result<Json<RefreshResult>, AppError> {
    let result = state.pipeline.refresh_comps(id, params.notify).await?;
    Ok(Json(result))
}

async fn set_note(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<NoteQuery>,
) -> Result<Json<NoteResponse>, AppError> {
    let row = state
        .pipeline
        .repo()
        .set_note(id, params.label.as_deref(), params.note.as_deref())
        .await?;
    Ok(Json(NoteResponse {
        ok: true,
        id: row.id,
        label: row.label,
        note: row.note,
    }))
}

async fn get_recent(
    State(state): State<ApiState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<RowsResponse>, AppError> {
    let filter = ListingFilter {
        limit: clamp_limit(params.limit, RECENT_DEFAULT_LIMIT, RECENT_MAX_LIMIT),
        label: params.label,
        min_price: price_bound("min_price", params.min_price)?,
        max_price: price_bound("max_price", params.max_price)?,
    };
    let rows = state.pipeline.repo().recent(&filter).await?;
    Ok(Json(RowsResponse { rows }))
}

async fn search(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim().to_string();
    if query.chars().count() < SEARCH_MIN_QUERY_CHARS {
        return Err(AppError::BadRequest(format!(
            "q must be at least {SEARCH_MIN_QUERY_CHARS} characters"
        )));
    }

    let filter = ListingFilter {
        limit: clamp_limit(params.limit, SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT),
        label: params.label,
        min_price: price_bound("min_price", params.min_price)?,
        max_price: price_bound("max_price", params.max_price)?,
    };
    let rows = state.pipeline.repo().search(&query, &filter).await?;
    Ok(Json(SearchResponse { rows, query }))
}

async fn export_csv(
    State(state): State<ApiState>,
    Query(params): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = clamp_limit(params.limit, EXPORT_DEFAULT_LIMIT, EXPORT_MAX_LIMIT);
    let rows = state.pipeline.repo().export_rows(limit).await?;
    let body = listings_csv(&rows)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"listings.csv\""),
        ],
        body,
    ))
}

async fn get_labels(State(state): State<ApiState>) -> Result<Json<LabelsResponse>, AppError> {
    let counts = state
        .pipeline
        .repo()
        .label_counts()
        .await?
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    Ok(Json(LabelsResponse { counts }))
}

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let listings_total = state.pipeline.repo().count().await?;
    let last = state.health.last_refresh_at_ns();
    Ok(Json(HealthResponse {
        status: "ok",
        listings_total,
        listings_processed: state.health.listings_processed(),
        empty_comp_summaries: state.health.empty_comp_summaries(),
        alerts_sent: state.health.alerts_sent(),
        alerts_failed: state.health.alerts_failed(),
        last_refresh_at_ns: (last > 0).then_some(last),
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}
