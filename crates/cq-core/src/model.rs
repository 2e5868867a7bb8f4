use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of `dataset_metadata` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
  pub id: String,
  pub source_dir: String,
  pub files_count: u64,
  pub loaded_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub dataset_type: DatasetType,
  pub parent_dataset_id: Option<String>,
  pub source_branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
  Main,
  Fork,
  Worktree,
  Temporary,
}

impl DatasetType {
  pub fn as_str(&self) -> &'static str {
    match self {
      DatasetType::Main => "main",
      DatasetType::Fork => "fork",
      DatasetType::Worktree => "worktree",
      DatasetType::Temporary => "temporary",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "main" => Some(DatasetType::Main),
      "fork" => Some(DatasetType::Fork),
      "worktree" => Some(DatasetType::Worktree),
      "temporary" => Some(DatasetType::Temporary),
      _ => None,
    }
  }

  /// spec.md I7: worktree/fork types require a parent; worktree additionally
  /// requires `source_branch`.
  pub fn requires_parent(&self) -> bool {
    matches!(self, DatasetType::Fork | DatasetType::Worktree)
  }

  pub fn requires_branch(&self) -> bool {
    matches!(self, DatasetType::Worktree)
  }
}

/// Structured blob columns: name → free-form attribute map (spec.md §3).
pub type StructuredBlob = BTreeMap<String, serde_json::Value>;

/// One row of `files` (spec.md §3). `(dataset, filepath)` is the primary
/// identity (I1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDoc {
  pub filepath: String,
  pub filename: String,
  pub dataset: String,
  pub overview: String,
  pub ddd_context: Option<String>,
  pub functions: Option<StructuredBlob>,
  pub exports: Option<StructuredBlob>,
  pub imports: Option<StructuredBlob>,
  pub types_interfaces_classes: Option<StructuredBlob>,
  pub constants: Option<StructuredBlob>,
  pub dependencies: Vec<String>,
  pub other_notes: Vec<String>,
  pub full_content: Option<String>,
  pub content_hash: String,
  pub documented_at_commit: Option<String>,
  pub documented_at: DateTime<Utc>,
}

/// Keys accepted by `update_documentation`'s partial-update map (spec.md
/// C4 `update_documentation`, P6: unknown keys are rejected).
pub const UPDATABLE_FILEDOC_FIELDS: &[&str] = &[
  "overview",
  "ddd_context",
  "functions",
  "exports",
  "imports",
  "types_interfaces_classes",
  "constants",
  "dependencies",
  "other_notes",
  "full_content",
  "content_hash",
  "documented_at_commit",
];

/// The non-storage twin of `FileDoc` produced by an analyzer (spec.md
/// §4.7): same fields minus `dataset`/identity concerns that only exist
/// once the pipeline persists the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
  pub filepath: String,
  pub filename: String,
  pub language: String,
  pub overview: String,
  pub ddd_context: Option<String>,
  pub functions: Option<StructuredBlob>,
  pub exports: Option<StructuredBlob>,
  pub imports: Option<StructuredBlob>,
  pub types_interfaces_classes: Option<StructuredBlob>,
  pub constants: Option<StructuredBlob>,
  pub dependencies: Vec<String>,
  pub other_notes: Vec<String>,
  pub full_content: Option<String>,
  pub content_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
  Content,
  Metadata,
  Unified,
}

impl MatchType {
  pub fn as_str(&self) -> &'static str {
    match self {
      MatchType::Content => "content",
      MatchType::Metadata => "metadata",
      MatchType::Unified => "unified",
    }
  }
}

/// Search result record (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  pub filepath: String,
  pub filename: String,
  pub dataset: String,
  pub score: f64,
  pub snippet: Option<String>,
  pub match_type: MatchType,
  pub overview: Option<String>,
  pub ddd_context: Option<String>,
}

/// One entry of the background queue (spec.md §3, §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
  pub filepath: String,
  pub dataset: String,
  pub commit_hash: Option<String>,
  pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexityLevel {
  Simple,
  Moderate,
  Complex,
  TooComplex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
  Unified,
  MetadataOnly,
  ContentOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeduplicationStrategy {
  ByFilepath,
  None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
  PreCommit,
  PostMerge,
}

impl HookType {
  pub fn as_str(&self) -> &'static str {
    match self {
      HookType::PreCommit => "pre-commit",
      HookType::PostMerge => "post-merge",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
  Manual,
  Auto,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dataset_type_roundtrips_through_str() {
    for t in [DatasetType::Main, DatasetType::Fork, DatasetType::Worktree, DatasetType::Temporary] {
      assert_eq!(DatasetType::parse(t.as_str()), Some(t));
    }
  }

  #[test]
  fn fork_and_worktree_require_parent() {
    assert!(DatasetType::Fork.requires_parent());
    assert!(DatasetType::Worktree.requires_parent());
    assert!(!DatasetType::Main.requires_parent());
    assert!(DatasetType::Worktree.requires_branch());
    assert!(!DatasetType::Fork.requires_branch());
  }

  #[test]
  fn updatable_fields_excludes_identity_columns() {
    assert!(!UPDATABLE_FILEDOC_FIELDS.contains(&"filepath"));
    assert!(!UPDATABLE_FILEDOC_FIELDS.contains(&"dataset"));
    assert!(UPDATABLE_FILEDOC_FIELDS.contains(&"overview"));
  }
}
