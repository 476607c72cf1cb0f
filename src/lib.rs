//! Authoring store: an in-memory, remotely synchronized store of learning
//! modules, problems, concepts and misconceptions.
//!
//! - `repo`: normalized repositories mirrored to the remote state source
//! - `compose`: denormalized module view (problem ids -> problem copies)
//! - `sync`: initial load, self-healing defaults, remote push consumers
//! - `store`: CRUD façade with cascade delete and reactive slices
//! - `routes`: axum HTTP + WebSocket surface for the authoring UI

pub mod compose;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod remote;
pub mod repo;
pub mod routes;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod util;

pub use context::AppContext;
pub use error::{StoreError, StoreResult};
pub use store::Store;
