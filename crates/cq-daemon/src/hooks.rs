use std::path::Path;

use chrono::Utc;
use cq_core::{QueueEntry, QueueMode};
use cq_db::Backend;
use cq_index::AnalyzerRegistry;
use tracing::{info, warn};

use crate::lockfile;
use crate::queue;

/// Runtime execution of a commit hook (spec.md §4.8 "Producer" +
/// "Fallback path"). Installation of the hook script itself lives in
/// `cq_core::hooks`; this is what the installed script actually invokes.
///
/// MUST NOT block the commit: every internal failure is logged and
/// swallowed rather than propagated, matching "any internal error returns
/// success to the VCS".
pub fn run_pre_commit(project_root: &Path, dataset: &str, mode: QueueMode, fallback_to_sync: bool, backend: &Backend, registry: &AnalyzerRegistry) {
  let staged = match cq_core::staged_files(project_root, &cq_index::known_extensions().iter().map(String::as_str).collect::<Vec<_>>()) {
    Ok(files) => files,
    Err(e) => {
      warn!(error = %e, "pre-commit hook: failed to list staged files, skipping");
      return;
    }
  };
  if staged.is_empty() {
    return;
  }

  let commit_hash = cq_core::current_branch(project_root).ok().flatten();
  let entries: Vec<QueueEntry> = staged
    .iter()
    .map(|filepath| QueueEntry {
      filepath: filepath.clone(),
      dataset: dataset.to_string(),
      commit_hash: commit_hash.clone(),
      enqueued_at: Utc::now(),
    })
    .collect();

  if let Err(e) = queue::enqueue(project_root, &entries) {
    warn!(error = %e, "pre-commit hook: failed to enqueue staged files");
    return;
  }
  info!(count = entries.len(), "pre-commit hook: queued staged files");

  if mode == QueueMode::Manual {
    return;
  }

  if lockfile::is_locked(project_root) {
    info!("pre-commit hook: worker is alive, leaving queued entries for it");
    return;
  }

  if !fallback_to_sync {
    info!("pre-commit hook: worker not running and fallback disabled, entries remain queued");
    return;
  }

  info!("pre-commit hook: worker not running, analyzing staged files synchronously");
  for filepath in &staged {
    let path = project_root.join(filepath);
    let analysis = match registry.analyze(&path) {
      Ok(a) => a,
      Err(e) => {
        warn!(filepath = filepath.as_str(), error = %e, "pre-commit fallback analysis failed");
        continue;
      }
    };
    let doc = cq_core::FileDoc {
      filepath: filepath.clone(),
      filename: analysis.filename,
      dataset: dataset.to_string(),
      overview: analysis.overview,
      ddd_context: analysis.ddd_context,
      functions: analysis.functions,
      exports: analysis.exports,
      imports: analysis.imports,
      types_interfaces_classes: analysis.types_interfaces_classes,
      constants: analysis.constants,
      dependencies: analysis.dependencies,
      other_notes: analysis.other_notes,
      full_content: analysis.full_content,
      content_hash: analysis.content_hash,
      documented_at_commit: commit_hash.clone(),
      documented_at: Utc::now(),
    };
    if let Err(e) = backend.insert_documentation(&doc) {
      warn!(filepath = filepath.as_str(), error = %e, "pre-commit fallback persist failed");
    }
  }
}

/// `post-merge` just surfaces guidance: it has no staged files to act on,
/// so it reports how far the local dataset has drifted from the merge
/// target rather than queuing anything itself (spec.md §4.8 lists
/// "post-merge guidance" without specifying queuing behavior for it).
pub fn post_merge_guidance(project_root: &Path, dataset: &str, backend: &Backend) -> String {
  let queued = queue::len(project_root).unwrap_or(0);
  let indexed = backend.get_dataset_files(dataset).map(|f| f.len()).unwrap_or(0);
  format!("dataset `{dataset}` has {indexed} indexed file(s) and {queued} queue entr(y/ies) pending; run the worker or a manual sync to catch up")
}

#[cfg(test)]
mod tests {
  use super::*;
  use cq_db::BackendConfig;
  use std::process::Command;
  use tempfile::TempDir;

  fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    Command::new("git").arg("init").arg("-q").current_dir(dir.path()).status().unwrap();
    Command::new("git").args(["config", "user.email", "t@example.com"]).current_dir(dir.path()).status().unwrap();
    Command::new("git").args(["config", "user.name", "t"]).current_dir(dir.path()).status().unwrap();
    dir
  }

  #[test]
  fn pre_commit_queues_staged_files_in_manual_mode() {
    let dir = init_repo();
    std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
    Command::new("git").args(["add", "a.rs"]).current_dir(dir.path()).status().unwrap();

    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", dir.path().to_str().unwrap(), cq_core::DatasetType::Main, None, None).unwrap();
    let registry = AnalyzerRegistry::new();

    run_pre_commit(dir.path(), "core", QueueMode::Manual, false, &backend, &registry);
    assert_eq!(queue::len(dir.path()).unwrap(), 1);
    assert!(backend.get_dataset_files("core").unwrap().is_empty());
  }

  #[test]
  fn pre_commit_auto_mode_falls_back_to_sync_when_worker_absent() {
    let dir = init_repo();
    std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
    Command::new("git").args(["add", "a.rs"]).current_dir(dir.path()).status().unwrap();

    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", dir.path().to_str().unwrap(), cq_core::DatasetType::Main, None, None).unwrap();
    let registry = AnalyzerRegistry::new();

    run_pre_commit(dir.path(), "core", QueueMode::Auto, true, &backend, &registry);
    assert_eq!(backend.get_dataset_files("core").unwrap(), vec!["a.rs".to_string()]);
  }

  #[test]
  fn pre_commit_with_no_staged_files_is_a_no_op() {
    let dir = init_repo();
    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", dir.path().to_str().unwrap(), cq_core::DatasetType::Main, None, None).unwrap();
    let registry = AnalyzerRegistry::new();

    run_pre_commit(dir.path(), "core", QueueMode::Auto, true, &backend, &registry);
    assert_eq!(queue::len(dir.path()).unwrap(), 0);
  }
}
