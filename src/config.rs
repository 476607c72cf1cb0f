//! Service configuration: optional TOML file at `STORE_CONFIG_PATH`, then
//! environment overrides.
//!
//! ```toml
//! [server]
//! port = 3000
//! static_dir = "./static"
//!
//! [remote]
//! mode = "http"            # or "memory"
//! base_url = "https://state.example.org/v1"
//! timeout_secs = 20
//! poll_interval_ms = 2000
//! ```

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
  pub server: ServerConfig,
  pub remote: RemoteConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
  pub port: u16,
  pub static_dir: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { port: 3000, static_dir: "./static".into() }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
  /// In-process remote; nothing survives a restart.
  #[default]
  Memory,
  Http,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
  pub mode: RemoteMode,
  pub base_url: String,
  /// Bearer token for the HTTP remote.
  pub api_key: Option<String>,
  pub timeout_secs: u64,
  pub poll_interval_ms: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      mode: RemoteMode::Memory,
      base_url: "http://127.0.0.1:8787".into(),
      api_key: None,
      timeout_secs: 20,
      poll_interval_ms: 2000,
    }
  }
}

impl AppConfig {
  /// TOML file (if `STORE_CONFIG_PATH` is set and parses) with env overrides
  /// applied on top. Never fails: unreadable input falls back to defaults.
  pub fn from_env() -> Self {
    let mut cfg = load_file_from_env().unwrap_or_default();
    cfg.apply_overrides(|name| std::env::var(name).ok());
    cfg
  }

  /// Applies `PORT`, `STATIC_DIR`, `REMOTE_MODE`, `REMOTE_BASE_URL`,
  /// `REMOTE_API_KEY`, `REMOTE_TIMEOUT_SECS` and `REMOTE_POLL_MS`.
  pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
    if let Some(port) = parse_var(&var, "PORT") {
      self.server.port = port;
    }
    if let Some(dir) = var("STATIC_DIR") {
      self.server.static_dir = dir;
    }
    if let Some(mode) = var("REMOTE_MODE") {
      match mode.trim().to_ascii_lowercase().as_str() {
        "memory" => self.remote.mode = RemoteMode::Memory,
        "http" => self.remote.mode = RemoteMode::Http,
        other => warn!(target: "authoring_store", mode = %other, "Unknown REMOTE_MODE ignored"),
      }
    }
    if let Some(url) = var("REMOTE_BASE_URL") {
      self.remote.base_url = url;
    }
    if let Some(key) = var("REMOTE_API_KEY") {
      self.remote.api_key = Some(key);
    }
    if let Some(secs) = parse_var(&var, "REMOTE_TIMEOUT_SECS") {
      self.remote.timeout_secs = secs;
    }
    if let Some(ms) = parse_var(&var, "REMOTE_POLL_MS") {
      self.remote.poll_interval_ms = ms;
    }
  }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
  let raw = var(name)?;
  match raw.trim().parse::<T>() {
    Ok(v) => Some(v),
    Err(_) => {
      warn!(target: "authoring_store", %name, value = %raw, "Unparseable env override ignored");
      None
    }
  }
}

fn load_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("STORE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "authoring_store", %path, "Loaded store config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "authoring_store", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "authoring_store", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
