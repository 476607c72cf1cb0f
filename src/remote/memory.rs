//! In-process remote state source.
//!
//! Backs local development (`REMOTE_MODE=memory`) and the test suite. Saves
//! notify every live subscription of the key, the writer's own included, but
//! only when the stored snapshot actually changed.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{
  Download, Environment, LoginProvider, RemoteError, RemoteResult, RemoteStateSource, Subscription, Upload,
};

#[derive(Default)]
struct MemoryState {
  states: HashMap<String, Value>,
  watchers: HashMap<String, Vec<mpsc::UnboundedSender<Value>>>,
  uploads: HashMap<String, Upload>,
  provider: Option<LoginProvider>,
  offline: bool,
  failing_keys: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryRemote {
  inner: Mutex<MemoryState>,
}

impl MemoryRemote {
  pub fn new() -> Self {
    Self::default()
  }

  /// Remote pre-populated with snapshots, e.g. `("mathModules", json!({...}))`.
  pub fn with_states<I, K>(states: I) -> Self
  where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
  {
    let state = MemoryState {
      states: states.into_iter().map(|(k, v)| (k.into(), v)).collect(),
      ..MemoryState::default()
    };
    Self { inner: Mutex::new(state) }
  }

  /// Makes every call fail with `RemoteError::Unavailable` while set.
  pub async fn set_offline(&self, offline: bool) {
    self.inner.lock().await.offline = offline;
  }

  /// Makes saves to `key` fail with `RemoteError::Unavailable`.
  pub async fn fail_saves_to(&self, key: &str) {
    self.inner.lock().await.failing_keys.insert(key.to_string());
  }

  /// Current stored snapshot, bypassing the offline switch.
  pub async fn snapshot(&self, key: &str) -> Option<Value> {
    self.inner.lock().await.states.get(key).cloned()
  }

  /// Writes `state` as another client would: stored and pushed to watchers.
  pub async fn push_external(&self, key: &str, state: Value) {
    let mut inner = self.inner.lock().await;
    store_and_notify(&mut inner, key, state);
  }

  pub async fn upload_count(&self) -> usize {
    self.inner.lock().await.uploads.len()
  }
}

fn store_and_notify(inner: &mut MemoryState, key: &str, state: Value) {
  if inner.states.get(key) == Some(&state) {
    return;
  }
  inner.states.insert(key.to_string(), state.clone());
  if let Some(senders) = inner.watchers.get_mut(key) {
    senders.retain(|tx| tx.send(state.clone()).is_ok());
    debug!(target: "remote", %key, watchers = senders.len(), "Pushed snapshot to watchers");
  }
}

fn ensure_online(inner: &MemoryState) -> RemoteResult<()> {
  if inner.offline {
    Err(RemoteError::Unavailable("memory remote is offline".into()))
  } else {
    Ok(())
  }
}

#[async_trait::async_trait]
impl RemoteStateSource for MemoryRemote {
  async fn load(&self, key: &str) -> RemoteResult<Value> {
    let inner = self.inner.lock().await;
    ensure_online(&inner)?;
    Ok(inner.states.get(key).cloned().unwrap_or_else(|| json!({})))
  }

  async fn save(&self, key: &str, state: Value) -> RemoteResult<()> {
    let mut inner = self.inner.lock().await;
    ensure_online(&inner)?;
    if inner.failing_keys.contains(key) {
      return Err(RemoteError::Unavailable(format!("writes to {key} are failing")));
    }
    store_and_notify(&mut inner, key, state);
    Ok(())
  }

  async fn watch(&self, key: &str) -> RemoteResult<Subscription> {
    let mut inner = self.inner.lock().await;
    ensure_online(&inner)?;
    let (tx, rx) = mpsc::unbounded_channel();
    inner.watchers.entry(key.to_string()).or_default().push(tx);
    Ok(Subscription::new(key, rx))
  }

  async fn environment(&self) -> RemoteResult<Environment> {
    let inner = self.inner.lock().await;
    ensure_online(&inner)?;
    let mut env = Environment {
      user: inner.provider.map(|p| format!("local-{}", p.as_str())),
      provider: inner.provider,
      ..Environment::default()
    };
    env.extra.insert("mode".into(), json!("memory"));
    Ok(env)
  }

  async fn login(&self, provider: LoginProvider) -> RemoteResult<()> {
    let mut inner = self.inner.lock().await;
    ensure_online(&inner)?;
    inner.provider = Some(provider);
    Ok(())
  }

  async fn logout(&self) -> RemoteResult<()> {
    let mut inner = self.inner.lock().await;
    ensure_online(&inner)?;
    inner.provider = None;
    Ok(())
  }

  fn uuid(&self) -> String {
    Uuid::new_v4().to_string()
  }

  async fn upload(&self, upload: Upload) -> RemoteResult<String> {
    let mut inner = self.inner.lock().await;
    ensure_online(&inner)?;
    let id = upload.id.clone();
    inner.uploads.insert(id.clone(), upload);
    Ok(id)
  }

  async fn download(&self, id: &str) -> RemoteResult<Download> {
    let inner = self.inner.lock().await;
    ensure_online(&inner)?;
    if !inner.uploads.contains_key(id) {
      return Err(RemoteError::NotFound(id.to_string()));
    }
    Ok(Download { url: format!("memory://uploads/{id}") })
  }
}
