//! Authoring Store · content-authoring backend
//!
//! - Axum HTTP + WebSocket API over the store façade
//! - Remote state source: in-memory (default) or HTTP state service
//! - Static SPA fallback (<static_dir>/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   STORE_CONFIG_PATH  : path to TOML config (server + remote sections)
//!   REMOTE_MODE        : "memory" (default) or "http"
//!   REMOTE_BASE_URL    : base URL of the HTTP state service
//!   REMOTE_API_KEY     : bearer token for the HTTP state service
//!   REMOTE_POLL_MS     : watch poll interval for the HTTP remote
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use authoring_store::config::AppConfig;
use authoring_store::routes::build_router;
use authoring_store::{telemetry, AppContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

  // The store must be fully loaded and watching before any request is served.
  let ctx = Arc::new(AppContext::init(config).await?);

  let app = build_router(ctx.clone());
  let listener = TcpListener::bind(addr).await?;
  info!(target: "authoring_store", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  ctx.shutdown().await;
  info!(target: "authoring_store", "Shut down cleanly");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "authoring_store", error = %e, "Failed to listen for ctrl-c");
  }
}
