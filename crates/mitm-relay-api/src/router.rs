//! API router configuration.

use axum::routing::get;
use axum::Router;
use mitm_relay_core::{ReportFeed, Stats};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};

/// Create the status/control router.
pub fn create_router(stats: Arc<Stats>, feed: Arc<ReportFeed>) -> Router {
    let state = AppState { stats, feed };

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::get_stats))
        .route("/sessions", get(handlers::get_sessions))
        .route("/history", get(handlers::get_history));

    let status_routes = Router::new()
        .route("/report", get(handlers::status_report))
        .route(
            "/loglevel/{level}",
            get(handlers::set_log_level).post(handlers::set_log_level),
        )
        .route("/stylesheet.css", get(handlers::stylesheet));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .nest(&format!("/{}", handlers::SERVICE_NAME), status_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use mitm_relay_core::{Direction, ObservationSink, SessionInfo};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<Stats>, Arc<ReportFeed>) {
        let stats = Arc::new(Stats::new(10));
        let feed = Arc::new(ReportFeed::new(true));
        (create_router(stats.clone(), feed.clone()), stats, feed)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn report_page_shows_last_buffers() {
        let (app, _, feed) = app();
        feed.record_buffer(Direction::Client, 4, b"GET / HTTP/1.0");

        let (status, body) = get_body(app, "/status/report").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<title>Status</title>"));
        assert!(body.contains("/status/stylesheet.css"));
        assert!(body.contains("From Client [4]:"));
        assert!(body.contains("no output buffer"));
    }

    #[tokio::test]
    async fn text_report_has_no_markup() {
        let (app, _, _) = app();
        let (status, body) = get_body(app, "/status/report?format=text").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("<html"));
        assert!(body.contains("no input buffer"));
    }

    #[tokio::test]
    async fn log_level_switches_traffic_logging() {
        let (app, _, feed) = app();

        let (status, body) = get_body(app.clone(), "/status/loglevel/0").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"traffic_logging\":false"));
        assert!(!feed.is_verbose());

        let (status, _) = get_body(app, "/status/loglevel/1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(feed.is_verbose());
    }

    #[tokio::test]
    async fn invalid_log_level_is_rejected() {
        let (app, _, feed) = app();
        let (status, _) = get_body(app.clone(), "/status/loglevel/loud").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_body(app, "/status/loglevel/256").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(feed.is_verbose());
    }

    #[tokio::test]
    async fn stylesheet_is_css() {
        let (app, _, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status/stylesheet.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[axum::http::header::CONTENT_TYPE], "text/css");
    }

    #[tokio::test]
    async fn sessions_endpoint_lists_active_sessions() {
        let (app, stats, _) = app();
        stats
            .add_session(SessionInfo::new(0, "127.0.0.1:9000".into(), "caster:2101".into(), true))
            .await;

        let (status, body) = get_body(app, "/api/sessions").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0]["upstream_addr"], "caster:2101");
        assert_eq!(json["data"][0]["state"], "dialing");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (app, _, _) = app();
        let (status, body) = get_body(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));
    }
}
