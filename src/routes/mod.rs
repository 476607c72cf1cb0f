//! Router assembly: store API, WebSocket slice feed, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::context::AppContext;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (pushes composed modules, concepts, misconceptions)
/// - store API under `/api/v1/...`
/// - Static authoring SPA from the configured directory with index fallback
/// - CORS (allow any origin/method/headers); tighten for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let static_dir = ctx.config.server.static_dir.clone();
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/environment", get(http::http_environment))
        .route("/api/v1/auth/login", post(http::http_login))
        .route("/api/v1/auth/logout", post(http::http_logout))
        .route("/api/v1/uuid", get(http::http_uuid))
        .route("/api/v1/modules", get(http::http_list_modules).post(http::http_add_module))
        .route(
            "/api/v1/modules/:id",
            get(http::http_get_module)
                .patch(http::http_update_module)
                .delete(http::http_delete_module),
        )
        .route("/api/v1/modules/:id/problems", post(http::http_add_problem))
        .route(
            "/api/v1/modules/:id/problems/:problem_id",
            put(http::http_update_problem).delete(http::http_delete_problem),
        )
        .route("/api/v1/concepts", get(http::http_list_concepts).post(http::http_add_concept))
        .route("/api/v1/concepts/:id", get(http::http_get_concept).put(http::http_update_concept))
        .route(
            "/api/v1/misconceptions",
            get(http::http_list_misconceptions).post(http::http_add_misconception),
        )
        .route(
            "/api/v1/misconceptions/:id",
            get(http::http_get_misconception).put(http::http_update_misconception),
        )
        .route("/api/v1/images", post(http::http_upload_image))
        .route("/api/v1/images/:id", get(http::http_image_url))
        .with_state(ctx)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
