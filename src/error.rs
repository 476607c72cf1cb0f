//! Error taxonomy for store operations.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::repo::Collection;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("module not found: {0}")]
  ModuleNotFound(String),

  #[error("problem {problem_id} not found in module {module_id}")]
  ProblemNotInModule { problem_id: String, module_id: String },

  #[error("concept not found: {0}")]
  ConceptNotFound(String),

  #[error("misconception not found: {0}")]
  MisconceptionNotFound(String),

  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error("malformed {collection} snapshot: {reason}")]
  MalformedSnapshot { collection: Collection, reason: String },

  /// The module and its problems were removed locally but at least one
  /// remote write failed.
  #[error("cascade delete of module {module_id} incomplete: {} remote write(s) failed", failures.len())]
  CascadeIncomplete { module_id: String, failures: Vec<RemoteError> },
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      StoreError::ModuleNotFound(_)
        | StoreError::ProblemNotInModule { .. }
        | StoreError::ConceptNotFound(_)
        | StoreError::MisconceptionNotFound(_)
    )
  }
}
