use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("queue is locked by another worker (pid {0})")]
  AlreadyRunning(u32),

  #[error("malformed queue file: {0}")]
  Queue(String),

  #[error(transparent)]
  Db(#[from] cq_db::DbError),

  #[error(transparent)]
  Index(#[from] cq_index::IndexError),
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;

impl From<DaemonError> for cq_core::Error {
  fn from(e: DaemonError) -> Self {
    match e {
      DaemonError::Io(e) => cq_core::Error::Io(e),
      DaemonError::AlreadyRunning(pid) => cq_core::Error::Conflict(format!("worker already running (pid {pid})")),
      DaemonError::Queue(m) => cq_core::Error::Storage(m),
      DaemonError::Db(db) => db.into(),
      DaemonError::Index(ie) => ie.into(),
    }
  }
}
