// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
//   GET  /health                 public liveness check (also /api/v1/health)
//   GET  /shortlist              latest results file + filtered shortlist
//   GET  /api/v1/scan/status     last scan summary, schedule, recent errors
//   POST /api/v1/scan            trigger a scan (Bearer PUSH_TOKEN)
//
// `/shortlist` reads the results file on every request and tags the response
// with the file's SHA-256 so pollers can use `If-None-Match`.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::auth::AuthBearer;
use crate::app_state::{AppState, ErrorRecord};
use crate::config::WatchItem;
use crate::results::{read_results, ScanRow};
use crate::scanner::ScanSummary;
use crate::shortlist::{build_shortlist, ShortlistFilter};
use crate::types::Trend;

// =============================================================================
// Router construction
// =============================================================================

/// Build the API router with CORS, request tracing and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/shortlist", get(shortlist))
        .route("/api/v1/scan/status", get(scan_status))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/scan", post(trigger_scan))
        // ── Middleware & State ───────────────────────────────────────
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.uptime_secs(),
    })
}

// =============================================================================
// Shortlist (public)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ShortlistQuery {
    #[serde(default)]
    min_score: Option<u8>,
    #[serde(default)]
    bias: Option<Trend>,
    #[serde(default)]
    cross_only: Option<bool>,
}

#[derive(Serialize)]
struct ShortlistResponse {
    message: &'static str,
    run_time: Option<String>,
    count: usize,
    shortlist: Vec<ScanRow>,
    /// Raw CSV text of the results file.
    data: String,
}

/// `true` when an `If-None-Match` header names `etag` (or is `*`).
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    value.split(',').map(str::trim).any(|tag| {
        tag == "*" || tag.trim_start_matches("W/").trim_matches('"') == etag
    })
}

async fn shortlist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ShortlistQuery>,
    headers: HeaderMap,
) -> Response {
    let file = match read_results(&state.config.output_csv) {
        Ok(Some(file)) => file,
        Ok(None) => {
            return Json(serde_json::json!({ "error": "No scan results yet" })).into_response();
        }
        Err(e) => {
            error!(error = %e, "failed to read results file");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read scan results");
        }
    };

    let etag_header = HeaderValue::from_str(&format!("\"{}\"", file.etag)).ok();

    if etag_matches(&headers, &file.etag) {
        let mut resp = StatusCode::NOT_MODIFIED.into_response();
        if let Some(tag) = etag_header {
            resp.headers_mut().insert(header::ETAG, tag);
        }
        return resp;
    }

    let filter = ShortlistFilter {
        min_score: query.min_score.unwrap_or(state.config.shortlist_min_score),
        bias: query.bias,
        cross_only: query.cross_only.unwrap_or(false),
    };
    let picked = build_shortlist(&file.rows, &filter);

    let body = ShortlistResponse {
        message: "4H Scanner results",
        run_time: file.run_time().map(str::to_string),
        count: picked.len(),
        shortlist: picked,
        data: file.raw,
    };

    let mut resp = Json(body).into_response();
    if let Some(tag) = etag_header {
        resp.headers_mut().insert(header::ETAG, tag);
    }
    resp
}

// =============================================================================
// Scan status (public)
// =============================================================================

#[derive(Serialize)]
struct ScanStatusResponse {
    in_progress: bool,
    last_scan: Option<ScanSummary>,
    next_scheduled: Option<String>,
    schedule: String,
    timeframe: String,
    watchlist: Vec<WatchItem>,
    recent_errors: Vec<ErrorRecord>,
}

async fn scan_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ScanStatusResponse {
        in_progress: state.scan_in_progress(),
        last_scan: state.last_scan.read().clone(),
        next_scheduled: (*state.next_scheduled.read()).map(|t| t.to_rfc3339()),
        schedule: state.config.schedule.clone(),
        timeframe: state.config.timeframe.to_string(),
        watchlist: state.config.watchlist.clone(),
        recent_errors: state.recent_errors.read().clone(),
    })
}

// =============================================================================
// Manual scan (authenticated)
// =============================================================================

async fn trigger_scan(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Response {
    let Some(guard) = state.try_begin_scan() else {
        return json_error(StatusCode::CONFLICT, "A scan is already in progress");
    };

    info!("manual scan requested");
    let scan_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = scan_state.run_claimed_scan(guard).await {
            error!(error = %e, "manual scan failed");
        }
    });

    let body = serde_json::json!({
        "message": "Scan started",
        "symbols": state.config.watchlist.len(),
    });
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

// =============================================================================
// Tests
// =============================================================================
