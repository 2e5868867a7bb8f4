use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("walk error: {0}")]
  Walk(#[from] ignore::Error),

  #[error("invalid glob pattern: {0}")]
  InvalidGlob(String),

  #[error(transparent)]
  Db(#[from] cq_db::DbError),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

impl From<IndexError> for cq_core::Error {
  fn from(e: IndexError) -> Self {
    match e {
      IndexError::Io(e) => cq_core::Error::Io(e),
      IndexError::Walk(e) => cq_core::Error::Storage(e.to_string()),
      IndexError::InvalidGlob(m) => cq_core::Error::Validation(m),
      IndexError::Db(db) => db.into(),
    }
  }
}
