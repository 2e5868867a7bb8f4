use thiserror::Error;

/// Closed error taxonomy shared by every crate in the workspace.
///
/// Component-local errors (`cq_db::DbError`, `cq_search::SearchError`, …)
/// carry richer context but always convert into one of these variants at
/// the crate boundary, so callers can match on category without
/// downcasting a concrete type.
#[derive(Error, Debug)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("storage error: {0}")]
  Storage(String),

  #[error("query timed out after {0}ms")]
  QueryTimeout(u64),

  #[error("query too complex: {0}")]
  QueryTooComplex(String),

  #[error("unsupported operation: {0}")]
  UnsupportedOperation(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("vcs error: {0}")]
  Vcs(String),

  #[error("cancelled")]
  Cancelled,
}

/// Stable category tag, for callers that want to branch on taxonomy
/// without a full `match` (e.g. HTTP/RPC status mapping at an outer layer
/// not specified here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
  ValidationError,
  NotFound,
  Conflict,
  StorageError,
  QueryTimeout,
  QueryTooComplex,
  UnsupportedOperation,
  IoError,
  VcsError,
  Cancelled,
}

impl Error {
  pub fn category(&self) -> ErrorCategory {
    match self {
      Error::Validation(_) => ErrorCategory::ValidationError,
      Error::NotFound(_) => ErrorCategory::NotFound,
      Error::Conflict(_) => ErrorCategory::Conflict,
      Error::Storage(_) => ErrorCategory::StorageError,
      Error::QueryTimeout(_) => ErrorCategory::QueryTimeout,
      Error::QueryTooComplex(_) => ErrorCategory::QueryTooComplex,
      Error::UnsupportedOperation(_) => ErrorCategory::UnsupportedOperation,
      Error::Io(_) => ErrorCategory::IoError,
      Error::Vcs(_) => ErrorCategory::VcsError,
      Error::Cancelled => ErrorCategory::Cancelled,
    }
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Error::Validation(msg.into())
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Error::NotFound(msg.into())
  }

  pub fn conflict(msg: impl Into<String>) -> Self {
    Error::Conflict(msg.into())
  }

  pub fn storage(msg: impl Into<String>) -> Self {
    Error::Storage(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn category_matches_variant() {
    assert_eq!(Error::validation("x").category(), ErrorCategory::ValidationError);
    assert_eq!(Error::QueryTimeout(5000).category(), ErrorCategory::QueryTimeout);
    assert_eq!(Error::Cancelled.category(), ErrorCategory::Cancelled);
  }
}
