//! reqwest client for an HTTP state service.
//!
//! Endpoints (relative to `base_url`):
//!   GET/PUT `state/{key}`, GET `environment`, POST `auth/login`,
//!   POST `auth/logout`, POST `uploads`, GET `uploads/{id}`.
//!
//! The service has no push channel, so `watch` polls `state/{key}` and emits a
//! snapshot only when it differs from the previously emitted one.
//!
//! NOTE: the bearer token is never logged; bodies are truncated in error logs.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
  Download, Environment, LoginProvider, RemoteError, RemoteResult, RemoteStateSource, Subscription, Upload,
};
use crate::config::RemoteConfig;
use crate::util::trunc_for_log;

const CLIENT_AGENT: &str = concat!("authoring-store/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  base_url: String,
  api_key: Option<String>,
  poll_interval: Duration,
}

#[derive(Serialize)]
struct UploadReq<'a> {
  id: &'a str,
  name: &'a str,
  #[serde(rename = "type")]
  mime_type: &'a str,
  /// base64 (standard alphabet)
  data: String,
}

#[derive(Deserialize)]
struct UploadResp {
  id: String,
}

impl HttpRemote {
  pub fn new(cfg: &RemoteConfig) -> RemoteResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .map_err(|e| RemoteError::Unavailable(format!("HTTP client init failed: {e}")))?;

    Ok(Self {
      client,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      api_key: cfg.api_key.clone(),
      poll_interval: Duration::from_millis(cfg.poll_interval_ms.max(1)),
    })
  }

  pub fn base_url(&self) -> &str { &self.base_url }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path)
  }

  fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
    let req = req.header(USER_AGENT, CLIENT_AGENT).header(CONTENT_TYPE, "application/json");
    match &self.api_key {
      Some(key) => req.header(AUTHORIZATION, format!("Bearer {key}")),
      None => req,
    }
  }

  async fn send(&self, req: RequestBuilder) -> RemoteResult<Response> {
    let res = self
      .authorize(req)
      .send()
      .await
      .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

    if res.status().is_success() {
      return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    warn!(target: "remote", %status, body = %trunc_for_log(&body, 200), "Remote call rejected");
    Err(RemoteError::Http { status: status.as_u16(), message: extract_error(&body).unwrap_or(body) })
  }

  async fn json<T: for<'a> Deserialize<'a>>(res: Response) -> RemoteResult<T> {
    res.json::<T>().await.map_err(|e| RemoteError::Decode(e.to_string()))
  }
}

/// Pull `error` or `message` out of a JSON error body, if there is one.
fn extract_error(body: &str) -> Option<String> {
  let v: Value = serde_json::from_str(body).ok()?;
  v.get("error")
    .or_else(|| v.get("message"))
    .and_then(Value::as_str)
    .map(str::to_string)
}

#[async_trait::async_trait]
impl RemoteStateSource for HttpRemote {
  #[instrument(level = "debug", skip(self))]
  async fn load(&self, key: &str) -> RemoteResult<Value> {
    let req = self.client.get(self.url(&format!("state/{key}")));
    match self.send(req).await {
      Ok(res) => Self::json(res).await,
      // A key nobody has written yet reads as an empty snapshot.
      Err(RemoteError::Http { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(json!({})),
      Err(e) => Err(e),
    }
  }

  #[instrument(level = "debug", skip(self, state))]
  async fn save(&self, key: &str, state: Value) -> RemoteResult<()> {
    let req = self.client.put(self.url(&format!("state/{key}"))).json(&state);
    self.send(req).await.map(|_| ())
  }

  async fn watch(&self, key: &str) -> RemoteResult<Subscription> {
    let (tx, rx) = mpsc::unbounded_channel();
    let this = self.clone();
    let watched = key.to_string();

    let poller = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(this.poll_interval);
      let mut last: Option<Value> = None;
      loop {
        ticker.tick().await;
        if tx.is_closed() {
          break;
        }
        match this.load(&watched).await {
          Ok(snapshot) if last.as_ref() != Some(&snapshot) => {
            last = Some(snapshot.clone());
            if tx.send(snapshot).is_err() {
              break;
            }
          }
          Ok(_) => {}
          Err(e) => warn!(target: "remote", key = %watched, error = %e, "Poll failed; retrying next tick"),
        }
      }
      debug!(target: "remote", key = %watched, "Poller stopped");
    });

    Ok(Subscription::with_feeder(key, rx, poller))
  }

  async fn environment(&self) -> RemoteResult<Environment> {
    let res = self.send(self.client.get(self.url("environment"))).await?;
    Self::json(res).await
  }

  #[instrument(level = "info", skip(self))]
  async fn login(&self, provider: LoginProvider) -> RemoteResult<()> {
    let req = self.client.post(self.url("auth/login")).json(&json!({ "provider": provider }));
    self.send(req).await.map(|_| ())
  }

  #[instrument(level = "info", skip(self))]
  async fn logout(&self) -> RemoteResult<()> {
    self.send(self.client.post(self.url("auth/logout"))).await.map(|_| ())
  }

  fn uuid(&self) -> String {
    Uuid::new_v4().to_string()
  }

  #[instrument(level = "info", skip(self, upload), fields(id = %upload.id, size = upload.data.len()))]
  async fn upload(&self, upload: Upload) -> RemoteResult<String> {
    let body = UploadReq {
      id: &upload.id,
      name: &upload.name,
      mime_type: &upload.mime_type,
      data: BASE64.encode(&upload.data),
    };
    let res = self.send(self.client.post(self.url("uploads")).json(&body)).await?;
    Ok(Self::json::<UploadResp>(res).await?.id)
  }

  async fn download(&self, id: &str) -> RemoteResult<Download> {
    match self.send(self.client.get(self.url(&format!("uploads/{id}")))).await {
      Ok(res) => Self::json(res).await,
      Err(RemoteError::Http { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
        Err(RemoteError::NotFound(id.to_string()))
      }
      Err(e) => Err(e),
    }
  }
}
