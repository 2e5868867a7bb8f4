use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
  #[error("query too complex: {0}")]
  TooComplex(String),

  #[error(transparent)]
  Db(#[from] cq_db::DbError),
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

impl From<SearchError> for cq_core::Error {
  fn from(e: SearchError) -> Self {
    match e {
      SearchError::TooComplex(m) => cq_core::Error::QueryTooComplex(m),
      SearchError::Db(db) => db.into(),
    }
  }
}
