use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("connection pool error: {0}")]
  Pool(String),

  #[error("timed out waiting for a pooled connection: {0}")]
  PoolTimeout(String),

  #[error("migration failed: {0}")]
  Migration(String),

  #[error("storage error: {0}")]
  Storage(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unsupported operation: {0}")]
  UnsupportedOperation(String),

  #[error("query timed out after {0}ms")]
  QueryTimeout(u64),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for cq_core::Error {
  fn from(e: DbError) -> Self {
    match e {
      DbError::NotFound(m) => cq_core::Error::NotFound(m),
      DbError::Validation(m) => cq_core::Error::Validation(m),
      DbError::Conflict(m) => cq_core::Error::Conflict(m),
      DbError::UnsupportedOperation(m) => cq_core::Error::UnsupportedOperation(m),
      DbError::QueryTimeout(ms) => cq_core::Error::QueryTimeout(ms),
      DbError::Storage(m) => cq_core::Error::Storage(m),
      DbError::Io(e) => cq_core::Error::Io(e),
      other => cq_core::Error::Storage(other.to_string()),
    }
  }
}
