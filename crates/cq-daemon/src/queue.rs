use std::fs;
use std::path::{Path, PathBuf};

use cq_core::QueueEntry;

use crate::error::{DaemonError, DaemonResult};

/// `<project>/.code-query/file_queue.json` (spec.md §4.8 "a queue file
/// (JSON list, append + atomic rename)"; named exactly per spec.md §6's
/// on-disk layout).
pub fn queue_path(project_root: &Path) -> PathBuf {
  project_root.join(".code-query").join("file_queue.json")
}

fn read_entries(path: &Path) -> DaemonResult<Vec<QueueEntry>> {
  if !path.exists() {
    return Ok(Vec::new());
  }
  let raw = fs::read_to_string(path)?;
  if raw.trim().is_empty() {
    return Ok(Vec::new());
  }
  serde_json::from_str(&raw).map_err(|e| DaemonError::Queue(format!("malformed queue at {path:?}: {e}")))
}

fn write_entries(project_root: &Path, path: &Path, entries: &[QueueEntry]) -> DaemonResult<()> {
  let dir = path.parent().unwrap_or(project_root);
  fs::create_dir_all(dir)?;
  let tmp = dir.join("file_queue.json.tmp");
  let serialized = serde_json::to_string_pretty(entries).map_err(|e| DaemonError::Queue(e.to_string()))?;
  fs::write(&tmp, serialized)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

/// Append `new_entries` to the queue file (spec.md §4.8 "Producer").
pub fn enqueue(project_root: &Path, new_entries: &[QueueEntry]) -> DaemonResult<()> {
  let path = queue_path(project_root);
  let mut entries = read_entries(&path)?;
  entries.extend(new_entries.iter().cloned());
  write_entries(project_root, &path, &entries)
}

/// Remove and return up to `batch_size` entries from the front of the
/// queue, atomically rewriting the remainder (spec.md §4.8 "Worker ...
/// polls the queue, drains into the documentation pipeline in batches").
pub fn drain(project_root: &Path, batch_size: usize) -> DaemonResult<Vec<QueueEntry>> {
  let path = queue_path(project_root);
  let mut entries = read_entries(&path)?;
  if entries.is_empty() {
    return Ok(Vec::new());
  }
  let split_at = batch_size.min(entries.len());
  let remainder = entries.split_off(split_at);
  write_entries(project_root, &path, &remainder)?;
  Ok(entries)
}

pub fn len(project_root: &Path) -> DaemonResult<usize> {
  Ok(read_entries(&queue_path(project_root))?.len())
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use tempfile::TempDir;

  fn entry(filepath: &str) -> QueueEntry {
    QueueEntry {
      filepath: filepath.to_string(),
      dataset: "core".to_string(),
      commit_hash: None,
      enqueued_at: Utc::now(),
    }
  }

  #[test]
  fn enqueue_appends_without_clobbering() {
    let dir = TempDir::new().unwrap();
    enqueue(dir.path(), &[entry("a.rs")]).unwrap();
    enqueue(dir.path(), &[entry("b.rs")]).unwrap();
    assert_eq!(len(dir.path()).unwrap(), 2);
  }

  #[test]
  fn drain_removes_only_requested_batch() {
    let dir = TempDir::new().unwrap();
    enqueue(dir.path(), &[entry("a.rs"), entry("b.rs"), entry("c.rs")]).unwrap();
    let batch = drain(dir.path(), 2).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].filepath, "a.rs");
    assert_eq!(len(dir.path()).unwrap(), 1);
  }

  #[test]
  fn drain_on_empty_queue_returns_empty() {
    let dir = TempDir::new().unwrap();
    let batch = drain(dir.path(), 10).unwrap();
    assert!(batch.is_empty());
  }
}
