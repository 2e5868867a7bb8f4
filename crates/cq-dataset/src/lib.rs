pub mod error;
pub mod service;

pub use error::{DatasetError, DatasetResult};
pub use service::{worktree_dataset_name, DatasetService, FileDiffEntry, FileDiffKind};
