//! Public protocol structs for the HTTP and WebSocket surface (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compose::ComposedModules;
use crate::domain::{Concept, Misconception, ProblemKind};
use crate::remote::LoginProvider;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdOut {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlOut {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ModuleUpdateIn {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct NewProblemIn {
    pub kind: ProblemKind,
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageUploadIn {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Standard base64.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub provider: LoginProvider,
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Re-send all three slices.
    Refresh,
}

/// Messages the server sends over WebSocket: whole slices, never deltas.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Modules { modules: Arc<ComposedModules> },
    Concepts { concepts: Arc<BTreeMap<String, Concept>> },
    Misconceptions { misconceptions: Arc<BTreeMap<String, Misconception>> },
    Error { message: String },
}
