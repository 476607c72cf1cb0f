//! Contract of the remote state source: snapshot load/save per key, push
//! notifications, identity generation, auth and blob upload/download.
//!
//! Payloads are opaque JSON here; the sync adapter and the store give them
//! meaning.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod http;
pub mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
  #[error("remote unavailable: {0}")]
  Unavailable(String),
  #[error("remote HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("remote payload could not be decoded: {0}")]
  Decode(String),
  #[error("remote object not found: {0}")]
  NotFound(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginProvider {
  Microsoft,
  Google,
}

impl LoginProvider {
  pub fn as_str(self) -> &'static str {
    match self {
      LoginProvider::Microsoft => "microsoft",
      LoginProvider::Google => "google",
    }
  }
}

/// Runtime environment reported by the remote (auth state, deployment info).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Environment {
  #[serde(default)]
  pub user: Option<String>,
  #[serde(default)]
  pub provider: Option<LoginProvider>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Binary object handed to `upload`.
#[derive(Clone, Debug, PartialEq)]
pub struct Upload {
  pub id: String,
  pub name: String,
  pub mime_type: String,
  pub data: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Download {
  pub url: String,
}

/// Stream of whole-collection snapshots pushed for one key.
///
/// Dropping the subscription (or calling `cancel`) ends delivery.
#[derive(Debug)]
pub struct Subscription {
  key: String,
  rx: mpsc::UnboundedReceiver<Value>,
  feeder: Option<JoinHandle<()>>,
}

impl Subscription {
  pub fn new(key: impl Into<String>, rx: mpsc::UnboundedReceiver<Value>) -> Self {
    Self { key: key.into(), rx, feeder: None }
  }

  /// Subscription whose snapshots are produced by a background task (polling
  /// remotes). The task is aborted with the subscription.
  pub fn with_feeder(key: impl Into<String>, rx: mpsc::UnboundedReceiver<Value>, feeder: JoinHandle<()>) -> Self {
    Self { key: key.into(), rx, feeder: Some(feeder) }
  }

  pub fn key(&self) -> &str { &self.key }

  /// Next pushed snapshot, or `None` once the subscription is closed.
  pub async fn recv(&mut self) -> Option<Value> {
    self.rx.recv().await
  }

  pub fn cancel(&mut self) {
    self.rx.close();
    if let Some(feeder) = self.feeder.take() {
      feeder.abort();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.cancel();
  }
}

#[async_trait::async_trait]
pub trait RemoteStateSource: Send + Sync {
  /// Current snapshot stored under `key` (`{}` when nothing was written yet).
  async fn load(&self, key: &str) -> RemoteResult<Value>;

  /// Replaces the snapshot stored under `key`.
  async fn save(&self, key: &str, state: Value) -> RemoteResult<()>;

  /// Registers for pushes of new snapshots under `key`.
  async fn watch(&self, key: &str) -> RemoteResult<Subscription>;

  async fn environment(&self) -> RemoteResult<Environment>;

  async fn login(&self, provider: LoginProvider) -> RemoteResult<()>;

  async fn logout(&self) -> RemoteResult<()>;

  /// Fresh opaque identifier.
  fn uuid(&self) -> String;

  /// Stores a binary object and returns its remote id.
  async fn upload(&self, upload: Upload) -> RemoteResult<String>;

  async fn download(&self, id: &str) -> RemoteResult<Download>;
}
