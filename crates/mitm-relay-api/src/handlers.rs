//! API route handlers.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use mitm_relay_core::{AggregatedStats, ReportFeed, SessionInfo, Stats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::pages;

/// Name every status request starts with.
pub const SERVICE_NAME: &str = "status";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<Stats>,
    pub feed: Arc<ReportFeed>,
}

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: None,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Stats response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub aggregated: AggregatedStats,
    pub active_sessions: Vec<SessionInfo>,
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Report query parameters.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}

/// Log level change response.
#[derive(Debug, Serialize)]
pub struct LogLevelResponse {
    pub level: u8,
    pub traffic_logging: bool,
}

/// Health check endpoint.
pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get relay statistics.
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsResponse>> {
    let aggregated = state.stats.get_aggregated().await;
    let active_sessions = state.stats.get_active().await;

    ApiResponse::ok(StatsResponse {
        aggregated,
        active_sessions,
    })
}

/// Get open sessions.
pub async fn get_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionInfo>>> {
    ApiResponse::ok(state.stats.get_active().await)
}

/// Get closed sessions.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<ApiResponse<Vec<SessionInfo>>> {
    ApiResponse::ok(state.stats.get_history(query.limit).await)
}

/// Last client and server buffers, as a page or as plain text.
pub async fn status_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let body = state.feed.status();
    match query.format.as_deref() {
        Some("text") => body.into_response(),
        _ => Html(pages::report_page(SERVICE_NAME, &body)).into_response(),
    }
}

/// Switch traffic logging: 0 turns it off, anything else on.
pub async fn set_log_level(
    State(state): State<AppState>,
    Path(level): Path<u8>,
) -> Json<ApiResponse<LogLevelResponse>> {
    state.feed.set_log_level(level);
    let traffic_logging = state.feed.is_verbose();
    info!(
        "Log level set to {}, traffic logging {}",
        level,
        if traffic_logging { "on" } else { "off" }
    );
    ApiResponse::ok(LogLevelResponse {
        level,
        traffic_logging,
    })
}

pub async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], pages::STYLESHEET)
}
