use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("validation error: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// spec.md §4.6 "Bidirectional sync is explicitly unsupported ... MUST
  /// fail with a typed error".
  #[error("unsupported sync direction: {0}")]
  UnsupportedSyncDirection(String),

  #[error(transparent)]
  Db(#[from] cq_db::DbError),
}

pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

impl From<DatasetError> for cq_core::Error {
  fn from(e: DatasetError) -> Self {
    match e {
      DatasetError::Validation(m) => cq_core::Error::Validation(m),
      DatasetError::NotFound(m) => cq_core::Error::NotFound(m),
      DatasetError::Conflict(m) => cq_core::Error::Conflict(m),
      DatasetError::UnsupportedSyncDirection(m) => cq_core::Error::UnsupportedOperation(m),
      DatasetError::Db(db) => db.into(),
    }
  }
}

impl From<cq_core::validation::ValidationError> for DatasetError {
  fn from(e: cq_core::validation::ValidationError) -> Self {
    DatasetError::Validation(e.to_string())
  }
}
