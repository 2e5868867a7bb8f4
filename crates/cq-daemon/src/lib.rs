pub mod error;
pub mod hooks;
pub mod lockfile;
pub mod queue;
pub mod worker;

pub use error::{DaemonError, DaemonResult};
pub use hooks::{post_merge_guidance, run_pre_commit};
pub use lockfile::{is_locked, lockfile_path, WorkerLock};
pub use queue::{drain, enqueue, len as queue_len, queue_path};
pub use worker::{log_dir, Worker, WorkerConfig, WORKER_LOG_FILE_NAME};
