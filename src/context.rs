//! Application context: the single store handle, built once at startup and
//! passed by reference to every consumer (HTTP handlers, WebSocket sessions).

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{AppConfig, RemoteMode};
use crate::error::StoreResult;
use crate::remote::{HttpRemote, MemoryRemote, RemoteStateSource};
use crate::store::Store;

pub struct AppContext {
  pub config: AppConfig,
  pub store: Arc<Store>,
}

impl AppContext {
  /// Builds the configured remote and initializes the store. Returns only
  /// after all four collections are loaded and watched.
  #[instrument(level = "info", skip_all, fields(mode = ?config.remote.mode))]
  pub async fn init(config: AppConfig) -> StoreResult<Self> {
    let remote: Arc<dyn RemoteStateSource> = match config.remote.mode {
      RemoteMode::Memory => {
        info!(target: "authoring_store", "Using in-memory remote; data is not persisted");
        Arc::new(MemoryRemote::new())
      }
      RemoteMode::Http => {
        info!(target: "authoring_store", base_url = %config.remote.base_url, "Using HTTP remote");
        Arc::new(HttpRemote::new(&config.remote)?)
      }
    };
    Self::with_remote(config, remote).await
  }

  /// Same as `init` with a caller-supplied remote.
  pub async fn with_remote(config: AppConfig, remote: Arc<dyn RemoteStateSource>) -> StoreResult<Self> {
    let store = Store::initialize(remote).await?;
    Ok(Self { config, store })
  }

  pub async fn shutdown(&self) {
    self.store.shutdown().await;
  }
}
