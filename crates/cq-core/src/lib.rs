pub mod config;
pub mod error;
pub mod hooks;
pub mod ids;
pub mod model;
pub mod validation;
pub mod vcs;

pub use config::{ConfigVersion, GitHookConfig, HookKind, HookMode, ProjectConfig, SetupChecklist};
pub use error::{Error, ErrorCategory, Result};
pub use hooks::{hooks_dir, install_hook, is_hook_installed, HOOK_MARKER};
pub use ids::{ProjectId, ProjectMetadata, find_git_root, resolve_project_path};
pub use model::{
  ComplexityLevel, Dataset, DatasetType, DeduplicationStrategy, FileAnalysis, FileDoc, HookType, MatchType, QueueEntry, QueueMode,
  SearchHit, SearchMode, StructuredBlob, UPDATABLE_FILEDOC_FIELDS,
};
pub use validation::{ValidationError, ValidationResult};
pub use vcs::{active_branches, current_branch, diff_paths, git_dir, is_worktree, staged_files, ChangeKind, DiffEntry};
