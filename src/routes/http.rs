//! HTTP endpoint handlers. These are thin wrappers that forward to the store.
//! Each handler is instrumented; store errors map to status codes in `ApiError`.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{info, instrument, warn};

use crate::context::AppContext;
use crate::domain::{Concept, Misconception, Problem, StateModule};
use crate::error::StoreError;
use crate::protocol::*;
use crate::store::ImageUpload;

/// Error body `{ "error": "..." }` with a status derived from the store error.
#[derive(Debug)]
pub enum ApiError {
  Store(StoreError),
  BadRequest(String),
  NotFound(String),
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self { ApiError::Store(e) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::Store(e) => {
        let status = match &e {
          e if e.is_not_found() => StatusCode::NOT_FOUND,
          StoreError::Remote(crate::remote::RemoteError::NotFound(_)) => StatusCode::NOT_FOUND,
          StoreError::Remote(_) | StoreError::CascadeIncomplete { .. } => StatusCode::BAD_GATEWAY,
          _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
      }
    };
    if status.is_server_error() {
      warn!(target: "authoring_store", %status, error = %message, "Request failed");
    }
    (status, Json(ErrorOut { error: message })).into_response()
  }
}

type ApiResult<T> = Result<T, ApiError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(ctx))]
pub async fn http_environment(State(ctx): State<Arc<AppContext>>) -> ApiResult<impl IntoResponse> {
  Ok(Json(ctx.store.environment().await?))
}

#[instrument(level = "info", skip(ctx, body))]
pub async fn http_login(State(ctx): State<Arc<AppContext>>, Json(body): Json<LoginIn>) -> ApiResult<StatusCode> {
  ctx.store.login(body.provider).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(ctx))]
pub async fn http_logout(State(ctx): State<Arc<AppContext>>) -> ApiResult<StatusCode> {
  ctx.store.logout().await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn http_uuid(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
  Json(IdOut { id: ctx.store.uuid() })
}

// --- Modules ---

#[instrument(level = "debug", skip(ctx))]
pub async fn http_list_modules(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
  Json(ctx.store.modules())
}

#[instrument(level = "info", skip(ctx, module), fields(module_id = %module.id))]
pub async fn http_add_module(
  State(ctx): State<Arc<AppContext>>,
  Json(module): Json<StateModule>,
) -> ApiResult<impl IntoResponse> {
  ctx.store.add_empty_module(&module).await?;
  let view = ctx.store.get_module(&module.id).unwrap_or(module);
  Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(level = "debug", skip(ctx))]
pub async fn http_get_module(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> ApiResult<Json<StateModule>> {
  ctx.store.get_module(&id).map(Json).ok_or_else(|| ApiError::NotFound(format!("module not found: {id}")))
}

#[instrument(level = "info", skip(ctx, body))]
pub async fn http_update_module(
  State(ctx): State<Arc<AppContext>>,
  Path(id): Path<String>,
  Json(body): Json<ModuleUpdateIn>,
) -> ApiResult<StatusCode> {
  ctx.store.update_module_name_description(&id, &body.name, &body.description).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(ctx))]
pub async fn http_delete_module(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> ApiResult<StatusCode> {
  ctx.store.delete_module(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// --- Problems ---

#[instrument(level = "info", skip(ctx, body), fields(kind = ?body.kind))]
pub async fn http_add_problem(
  State(ctx): State<Arc<AppContext>>,
  Path(module_id): Path<String>,
  Json(body): Json<NewProblemIn>,
) -> ApiResult<impl IntoResponse> {
  let problem = ctx.store.add_new_problem(&module_id, body.kind, &body.user_id).await?;
  info!(target: "store", %module_id, problem_id = %problem.id, "HTTP problem created");
  Ok((StatusCode::CREATED, Json(problem)))
}

#[instrument(level = "info", skip(ctx, problem))]
pub async fn http_update_problem(
  State(ctx): State<Arc<AppContext>>,
  Path((module_id, problem_id)): Path<(String, String)>,
  Json(problem): Json<Problem>,
) -> ApiResult<StatusCode> {
  if problem.id != problem_id {
    return Err(ApiError::BadRequest(format!("body id {} does not match path id {problem_id}", problem.id)));
  }
  ctx.store.update_problem(&module_id, &problem).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(ctx))]
pub async fn http_delete_problem(
  State(ctx): State<Arc<AppContext>>,
  Path((module_id, problem_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
  ctx.store.delete_problem(&problem_id, &module_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// --- Concepts ---

pub async fn http_list_concepts(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
  Json(ctx.store.concepts())
}

#[instrument(level = "info", skip(ctx, concept), fields(concept_id = %concept.id))]
pub async fn http_add_concept(
  State(ctx): State<Arc<AppContext>>,
  Json(concept): Json<Concept>,
) -> ApiResult<impl IntoResponse> {
  let stored = ctx.store.add_concept(&concept).await?;
  Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn http_get_concept(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> ApiResult<Json<Concept>> {
  ctx.store.get_concept(&id).map(Json).ok_or(ApiError::Store(StoreError::ConceptNotFound(id)))
}

#[instrument(level = "info", skip(ctx, concept))]
pub async fn http_update_concept(
  State(ctx): State<Arc<AppContext>>,
  Path(id): Path<String>,
  Json(mut concept): Json<Concept>,
) -> ApiResult<StatusCode> {
  concept.id = id;
  ctx.store.update_concept(&concept).await?;
  Ok(StatusCode::NO_CONTENT)
}

// --- Misconceptions ---

pub async fn http_list_misconceptions(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
  Json(ctx.store.misconceptions())
}

#[instrument(level = "info", skip(ctx, misconception), fields(misconception_id = %misconception.id))]
pub async fn http_add_misconception(
  State(ctx): State<Arc<AppContext>>,
  Json(misconception): Json<Misconception>,
) -> ApiResult<impl IntoResponse> {
  let stored = ctx.store.add_misconception(&misconception).await?;
  Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn http_get_misconception(
  State(ctx): State<Arc<AppContext>>,
  Path(id): Path<String>,
) -> ApiResult<Json<Misconception>> {
  ctx.store.get_misconception(&id).map(Json).ok_or(ApiError::Store(StoreError::MisconceptionNotFound(id)))
}

#[instrument(level = "info", skip(ctx, misconception))]
pub async fn http_update_misconception(
  State(ctx): State<Arc<AppContext>>,
  Path(id): Path<String>,
  Json(mut misconception): Json<Misconception>,
) -> ApiResult<StatusCode> {
  misconception.id = id;
  ctx.store.update_misconception(&misconception).await?;
  Ok(StatusCode::NO_CONTENT)
}

// --- Images ---

#[instrument(level = "info", skip(ctx, body), fields(name = %body.name, mime = %body.mime_type))]
pub async fn http_upload_image(
  State(ctx): State<Arc<AppContext>>,
  Json(body): Json<ImageUploadIn>,
) -> ApiResult<impl IntoResponse> {
  let data = BASE64
    .decode(body.data.as_bytes())
    .map_err(|e| ApiError::BadRequest(format!("image data is not valid base64: {e}")))?;
  let id = ctx
    .store
    .upload_image(ImageUpload { name: body.name, mime_type: body.mime_type, data })
    .await?;
  Ok((StatusCode::CREATED, Json(IdOut { id })))
}

#[instrument(level = "debug", skip(ctx))]
pub async fn http_image_url(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> ApiResult<Json<UrlOut>> {
  let url = ctx.store.get_image_url(&id).await?;
  Ok(Json(UrlOut { url }))
}
