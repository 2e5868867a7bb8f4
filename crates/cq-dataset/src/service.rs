use std::path::Path;

use chrono::Utc;
use cq_core::validation::validate_dataset_id;
use cq_core::{vcs, Dataset, DatasetType};
use cq_db::{Backend, DatasetStatistics};
use tracing::info;

use crate::error::{DatasetError, DatasetResult};

/// Dataset Service (spec.md C6): lifecycle of datasets sitting on top of
/// the storage backend, plus the worktree-naming and diff/orphan logic
/// that has no natural home inside C4 itself.
pub struct DatasetService<'a> {
  backend: &'a Backend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDiffKind {
  Added,
  Modified,
  Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiffEntry {
  pub filepath: String,
  pub kind: FileDiffKind,
}

impl<'a> DatasetService<'a> {
  pub fn new(backend: &'a Backend) -> Self {
    Self { backend }
  }

  fn validate_source_dir(source_dir: &str) -> DatasetResult<()> {
    let path = Path::new(source_dir);
    if !path.exists() || !path.is_dir() {
      return Err(DatasetError::Validation(format!("source_dir `{source_dir}` does not exist or is not readable")));
    }
    Ok(())
  }

  /// spec.md §4.6 "create": validates name + source_dir, and for
  /// fork/worktree types requires an existing `parent_id`.
  pub fn create(&self, id: &str, source_dir: &str, dataset_type: DatasetType, parent_id: Option<&str>, source_branch: Option<&str>) -> DatasetResult<()> {
    validate_dataset_id(id)?;
    Self::validate_source_dir(source_dir)?;
    if dataset_type.requires_parent() {
      let parent = parent_id.ok_or_else(|| DatasetError::Validation("parent_id is required for this dataset type".to_string()))?;
      if self.backend.get_dataset_metadata(parent)?.is_none() {
        return Err(DatasetError::NotFound(format!("parent dataset `{parent}` does not exist")));
      }
    }
    if dataset_type.requires_branch() && source_branch.is_none() {
      return Err(DatasetError::Validation("source_branch is required for worktree datasets".to_string()));
    }
    let created = self.backend.create_dataset(id, source_dir, dataset_type, parent_id, source_branch)?;
    if !created {
      return Err(DatasetError::Conflict(format!("dataset `{id}` already exists")));
    }
    Ok(())
  }

  pub fn get(&self, id: &str) -> DatasetResult<Option<Dataset>> {
    Ok(self.backend.get_dataset_metadata(id)?)
  }

  pub fn list(&self, parent_id: Option<&str>, dataset_type: Option<DatasetType>) -> DatasetResult<Vec<Dataset>> {
    Ok(self.backend.list_datasets(parent_id, dataset_type)?)
  }

  pub fn stats(&self, id: &str) -> DatasetResult<DatasetStatistics> {
    Ok(self.backend.get_dataset_statistics(id)?)
  }

  /// spec.md §4.6 "Fork": atomic copy of every source `FileDoc` into a new
  /// target dataset, refreshing `documented_at` but keeping `content_hash`
  /// (the copy is byte-identical, only its recency stamp changes).
  pub fn fork(&self, source_id: &str, target_id: &str) -> DatasetResult<()> {
    validate_dataset_id(target_id)?;
    let source = self
      .backend
      .get_dataset_metadata(source_id)?
      .ok_or_else(|| DatasetError::NotFound(format!("source dataset `{source_id}` does not exist")))?;

    self.backend.transaction(|tx| {
      let created = cq_db::datasets::create_dataset(tx, target_id, &source.source_dir, DatasetType::Fork, Some(source_id), None)?;
      if !created {
        return Err(cq_db::DbError::Conflict(format!("dataset `{target_id}` already exists")));
      }
      for filepath in cq_db::files::get_dataset_files(tx, source_id)? {
        if let Some(mut doc) = cq_db::files::get_file_documentation(tx, &filepath, source_id, true)? {
          doc.dataset = target_id.to_string();
          doc.documented_at = Utc::now();
          cq_db::files::insert_documentation(tx, &doc)?;
        }
      }
      cq_db::datasets::recompute_files_count(tx, target_id)?;
      Ok(())
    })?;
    Ok(())
  }

  /// spec.md §4.6 "Sync (one-directional)": diffs `source_ref..target_ref`
  /// and replays each change into `target_id`. Bidirectional sync has no
  /// representation here by design — callers that need it must issue two
  /// one-directional syncs, each individually auditable.
  pub fn sync(&self, source_id: &str, target_id: &str, repo_dir: &Path, source_ref: &str, target_ref: &str) -> DatasetResult<usize> {
    if source_id == target_id {
      return Err(DatasetError::UnsupportedSyncDirection("source and target dataset must differ".to_string()));
    }
    let diff = vcs::diff_paths(repo_dir, source_ref, target_ref).map_err(|e| DatasetError::Validation(e.to_string()))?;

    self.backend.transaction(|tx| {
      for entry in &diff {
        match entry.change {
          vcs::ChangeKind::Deleted => {
            cq_db::files::delete_documentation(tx, &entry.path, target_id)?;
          }
          vcs::ChangeKind::Added | vcs::ChangeKind::Modified => {
            if let Some(mut doc) = cq_db::files::get_file_documentation(tx, &entry.path, source_id, true)? {
              doc.dataset = target_id.to_string();
              doc.documented_at = Utc::now();
              cq_db::files::insert_documentation(tx, &doc)?;
            }
          }
        }
      }
      cq_db::datasets::recompute_files_count(tx, target_id)?;
      Ok(())
    })?;
    let applied = diff.len();
    info!(source_id, target_id, applied, "synced dataset");
    Ok(applied)
  }

  /// spec.md §4.6 "Diff between two datasets": `content_hash` equality
  /// classifies shared files, never timestamps.
  pub fn diff(&self, left_id: &str, right_id: &str) -> DatasetResult<Vec<FileDiffEntry>> {
    let left_files = self.backend.get_dataset_files(left_id)?;
    let right_files = self.backend.get_dataset_files(right_id)?;
    let mut out = Vec::new();

    for filepath in &left_files {
      let left_doc = self.backend.get_file_documentation(filepath, left_id, false)?;
      let right_doc = self.backend.get_file_documentation(filepath, right_id, false)?;
      match right_doc {
        None => out.push(FileDiffEntry {
          filepath: filepath.clone(),
          kind: FileDiffKind::Added,
        }),
        Some(right) => {
          if let Some(left) = left_doc {
            if left.content_hash != right.content_hash {
              out.push(FileDiffEntry {
                filepath: filepath.clone(),
                kind: FileDiffKind::Modified,
              });
            }
          }
        }
      }
    }
    for filepath in &right_files {
      if !left_files.contains(filepath) {
        out.push(FileDiffEntry {
          filepath: filepath.clone(),
          kind: FileDiffKind::Deleted,
        });
      }
    }
    out.sort_by(|a, b| a.filepath.cmp(&b.filepath));
    Ok(out)
  }

  /// spec.md §4.6 "Delete": fails if children exist and `force=false`;
  /// otherwise deletes all `FileDoc`s then the dataset row in one
  /// transaction (handled by `cq_db::datasets::delete_dataset`'s cascade).
  pub fn delete(&self, id: &str, force: bool) -> DatasetResult<()> {
    if !force {
      let children = self.backend.list_datasets(Some(id), None)?;
      if !children.is_empty() {
        return Err(DatasetError::Conflict(format!("dataset `{id}` has {} child dataset(s); pass force=true", children.len())));
      }
    }
    let deleted = self.backend.delete_dataset(id)?;
    if !deleted {
      return Err(DatasetError::NotFound(format!("dataset `{id}` does not exist")));
    }
    Ok(())
  }

  /// spec.md §4.6 "Orphan cleanup": a worktree dataset is orphaned when its
  /// `source_dir` no longer exists, is no longer a valid worktree, or its
  /// `source_branch` has vanished from the active branch list.
  pub fn cleanup_orphaned_datasets(&self, repo_dir: &Path, dry_run: bool) -> DatasetResult<Vec<String>> {
    let worktrees = self.backend.list_datasets(None, Some(DatasetType::Worktree))?;
    let active_branches = vcs::active_branches(repo_dir).unwrap_or_default();

    let mut orphaned = Vec::new();
    for ds in worktrees {
      let dir = Path::new(&ds.source_dir);
      let is_orphan = !dir.exists() || !vcs::is_worktree(dir) || ds.source_branch.as_deref().map(|b| !active_branches.contains(&b.to_string())).unwrap_or(true);
      if is_orphan {
        orphaned.push(ds.id);
      }
    }

    if !dry_run {
      for id in &orphaned {
        self.backend.delete_dataset(id)?;
      }
    }
    Ok(orphaned)
  }
}

/// spec.md §4.6 "Worktree detection" naming rule: `<main>__wt_<branch>`
/// with the branch sanitized to `[A-Za-z0-9_]`.
pub fn worktree_dataset_name(main_dataset: &str, branch: &str) -> String {
  let sanitized: String = branch.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
  format!("{main_dataset}__wt_{sanitized}")
}

#[cfg(test)]
mod tests {
  use super::*;
  use cq_db::BackendConfig;
  use tempfile::TempDir;

  fn backend_with_dir() -> (Backend, TempDir) {
    let dir = TempDir::new().unwrap();
    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    (backend, dir)
  }

  #[test]
  fn worktree_name_sanitizes_branch() {
    assert_eq!(worktree_dataset_name("core", "feature/login-fix"), "core__wt_feature_login_fix");
  }

  #[test]
  fn create_rejects_missing_source_dir() {
    let (backend, _dir) = backend_with_dir();
    let svc = DatasetService::new(&backend);
    let result = svc.create("core", "/nonexistent/path/xyz", DatasetType::Main, None, None);
    assert!(result.is_err());
  }

  #[test]
  fn create_requires_parent_for_fork() {
    let (backend, dir) = backend_with_dir();
    let svc = DatasetService::new(&backend);
    let result = svc.create("child", dir.path().to_str().unwrap(), DatasetType::Fork, None, None);
    assert!(matches!(result, Err(DatasetError::Validation(_))));
  }

  #[test]
  fn fork_copies_files_with_refreshed_timestamp() {
    let (backend, dir) = backend_with_dir();
    let svc = DatasetService::new(&backend);
    let path = dir.path().to_str().unwrap();
    svc.create("core", path, DatasetType::Main, None, None).unwrap();
    backend
      .insert_documentation(&cq_core::FileDoc {
        filepath: "a.rs".to_string(),
        filename: "a.rs".to_string(),
        dataset: "core".to_string(),
        overview: "o".to_string(),
        ddd_context: None,
        functions: None,
        exports: None,
        imports: None,
        types_interfaces_classes: None,
        constants: None,
        dependencies: vec![],
        other_notes: vec![],
        full_content: Some("fn x() {}".to_string()),
        content_hash: "h1".to_string(),
        documented_at_commit: None,
        documented_at: Utc::now(),
      })
      .unwrap();

    svc.fork("core", "core_fork").unwrap();
    let files = backend.get_dataset_files("core_fork").unwrap();
    assert_eq!(files, vec!["a.rs".to_string()]);
    let doc = backend.get_file_documentation("a.rs", "core_fork", false).unwrap().unwrap();
    assert_eq!(doc.content_hash, "h1");
  }

  #[test]
  fn delete_without_force_fails_when_children_exist() {
    let (backend, dir) = backend_with_dir();
    let svc = DatasetService::new(&backend);
    let path = dir.path().to_str().unwrap();
    svc.create("core", path, DatasetType::Main, None, None).unwrap();
    svc.fork("core", "core_fork").unwrap();
    let result = svc.delete("core", false);
    assert!(result.is_err());
  }

  #[test]
  fn diff_uses_content_hash_not_timestamps() {
    let (backend, dir) = backend_with_dir();
    let svc = DatasetService::new(&backend);
    let path = dir.path().to_str().unwrap();
    svc.create("left", path, DatasetType::Main, None, None).unwrap();
    svc.create("right", path, DatasetType::Main, None, None).unwrap();

    let doc = |dataset: &str, hash: &str| cq_core::FileDoc {
      filepath: "a.rs".to_string(),
      filename: "a.rs".to_string(),
      dataset: dataset.to_string(),
      overview: "o".to_string(),
      ddd_context: None,
      functions: None,
      exports: None,
      imports: None,
      types_interfaces_classes: None,
      constants: None,
      dependencies: vec![],
      other_notes: vec![],
      full_content: Some("content".to_string()),
      content_hash: hash.to_string(),
      documented_at_commit: None,
      documented_at: Utc::now(),
    };
    backend.insert_documentation(&doc("left", "same")).unwrap();
    backend.insert_documentation(&doc("right", "same")).unwrap();

    let result = svc.diff("left", "right").unwrap();
    assert!(result.is_empty(), "identical content_hash should not diff");
  }
}
