use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DaemonError, DaemonResult};

/// `<project>/.code-query/worker.pid` (spec.md §4.8 "Single-instance
/// discipline via a PID lockfile").
pub fn lockfile_path(project_root: &Path) -> PathBuf {
  project_root.join(".code-query").join("worker.pid")
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
  Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
  // No portable liveness check without an extra dependency; treat any
  // existing lockfile as held rather than risk a double-start.
  true
}

fn read_pid(path: &Path) -> Option<u32> {
  fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// A file exists AND its PID is still alive (spec.md §4.8 "Detection: file
/// exists AND PID still alive; stale PIDs are cleaned up on next start").
pub fn is_locked(project_root: &Path) -> bool {
  let path = lockfile_path(project_root);
  match read_pid(&path) {
    Some(pid) => process_alive(pid),
    None => false,
  }
}

/// RAII guard: removes the lockfile on drop so a crashed worker doesn't
/// wedge the next start indefinitely (the liveness check would still catch
/// it, but a clean stop should leave nothing behind).
pub struct WorkerLock {
  path: PathBuf,
}

impl WorkerLock {
  /// Acquire the lock, clearing a stale (dead-PID) file first. Fails with
  /// [`DaemonError::AlreadyRunning`] if a live worker already holds it.
  pub fn acquire(project_root: &Path) -> DaemonResult<Self> {
    let path = lockfile_path(project_root);
    if let Some(pid) = read_pid(&path) {
      if process_alive(pid) {
        return Err(DaemonError::AlreadyRunning(pid));
      }
      let _ = fs::remove_file(&path);
    }
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(&path, std::process::id().to_string())?;
    Ok(Self { path })
  }
}

impl Drop for WorkerLock {
  fn drop(&mut self) {
    let _ = fs::remove_file(&self.path);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_writes_own_pid() {
    let dir = TempDir::new().unwrap();
    let _lock = WorkerLock::acquire(dir.path()).unwrap();
    assert!(is_locked(dir.path()));
    let pid = read_pid(&lockfile_path(dir.path())).unwrap();
    assert_eq!(pid, std::process::id());
  }

  #[test]
  fn drop_releases_lock() {
    let dir = TempDir::new().unwrap();
    {
      let _lock = WorkerLock::acquire(dir.path()).unwrap();
    }
    assert!(!lockfile_path(dir.path()).exists());
  }

  #[test]
  fn stale_pid_is_cleaned_up_on_acquire() {
    let dir = TempDir::new().unwrap();
    let path = lockfile_path(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "999999999").unwrap(); // unlikely to be a live pid
    let lock = WorkerLock::acquire(dir.path());
    assert!(lock.is_ok());
  }
}
