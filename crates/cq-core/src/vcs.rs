use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::validation::validate_vcs_ref;

/// One entry of a two-ref diff (spec.md §4.6 Dataset Service `sync`/`diff`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
  pub path: String,
  pub change: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Added,
  Modified,
  Deleted,
}

fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String> {
  let output = Command::new("git")
    .arg("-C")
    .arg(repo_dir)
    .args(args)
    .output()
    .map_err(|e| Error::Vcs(format!("failed to spawn git {args:?}: {e}")))?;
  if !output.status.success() {
    return Err(Error::Vcs(format!("git {args:?} failed: {}", String::from_utf8_lossy(&output.stderr))));
  }
  String::from_utf8(output.stdout).map_err(|e| Error::Vcs(format!("git {args:?} produced non-utf8 output: {e}")))
}

/// Diff files between two refs as `(path, change)`, ordered `target..source`
/// (spec.md §4.6: "Diff files between refs (`target_ref..source_ref`)").
pub fn diff_paths(repo_dir: &Path, source_ref: &str, target_ref: &str) -> Result<Vec<DiffEntry>> {
  validate_vcs_ref(source_ref).map_err(|e| Error::Vcs(e.to_string()))?;
  validate_vcs_ref(target_ref).map_err(|e| Error::Vcs(e.to_string()))?;

  let range = format!("{target_ref}..{source_ref}");
  let raw = run_git(repo_dir, &["diff", "--name-status", &range])?;
  Ok(parse_name_status(&raw))
}

fn parse_name_status(raw: &str) -> Vec<DiffEntry> {
  raw
    .lines()
    .filter_map(|line| {
      let mut parts = line.splitn(2, '\t');
      let status = parts.next()?.trim();
      let path = parts.next()?.trim();
      if path.is_empty() {
        return None;
      }
      let change = match status.chars().next()? {
        'A' => ChangeKind::Added,
        'D' => ChangeKind::Deleted,
        _ => ChangeKind::Modified, // M, R, C, T all land here as "changed content"
      };
      Some(DiffEntry {
        path: path.to_string(),
        change,
      })
    })
    .collect()
}

/// Resolve the VCS-reported git directory (spec.md §4.9: "through the VCS
/// (`rev-parse --git-dir`), not by joining `.git/hooks`" — required for
/// worktrees, where `.git` is a file pointing elsewhere).
pub fn git_dir(repo_dir: &Path) -> Result<PathBuf> {
  let raw = run_git(repo_dir, &["rev-parse", "--git-dir"])?;
  let reported = PathBuf::from(raw.trim());
  if reported.is_absolute() {
    Ok(reported)
  } else {
    Ok(repo_dir.join(reported))
  }
}

/// A directory is a worktree iff its `.git` is a file, or the git-dir lies
/// outside the working directory (spec.md §4.6 "Worktree detection").
pub fn is_worktree(dir: &Path) -> bool {
  let dot_git = dir.join(".git");
  if dot_git.is_file() {
    return true;
  }
  match git_dir(dir) {
    Ok(gd) => {
      let canonical_gd = gd.canonicalize().unwrap_or(gd);
      let canonical_dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
      !canonical_gd.starts_with(&canonical_dir)
    }
    Err(_) => false,
  }
}

pub fn current_branch(dir: &Path) -> Result<Option<String>> {
  let raw = run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
  let branch = raw.trim();
  if branch.is_empty() || branch == "HEAD" {
    Ok(None)
  } else {
    Ok(Some(branch.to_string()))
  }
}

/// All local branch names, used by orphan-cleanup to check a worktree
/// dataset's `source_branch` is still active (spec.md §4.6).
pub fn active_branches(dir: &Path) -> Result<Vec<String>> {
  let raw = run_git(dir, &["branch", "--format=%(refname:short)"])?;
  Ok(raw.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}

/// Staged files matching a code-file extension set, for the pre-commit hook
/// producer (spec.md §6 "a pre-commit hook collects staged files matching a
/// code-file extension set").
pub fn staged_files(dir: &Path, extensions: &[&str]) -> Result<Vec<String>> {
  let raw = run_git(dir, &["diff", "--cached", "--name-only", "--diff-filter=ACM"])?;
  Ok(
    raw
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .filter(|l| extensions.iter().any(|ext| l.ends_with(ext)))
      .map(str::to_string)
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_name_status_lines() {
    let raw = "A\tsrc/new.rs\nM\tsrc/changed.rs\nD\tsrc/gone.rs\n";
    let entries = parse_name_status(raw);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].change, ChangeKind::Added);
    assert_eq!(entries[1].change, ChangeKind::Modified);
    assert_eq!(entries[2].change, ChangeKind::Deleted);
    assert_eq!(entries[0].path, "src/new.rs");
  }

  #[test]
  fn rename_status_is_treated_as_modified() {
    let raw = "R100\told.rs\tnew.rs\n";
    // rename lines carry two paths; splitn(2, '\t') keeps everything after
    // the first tab as "path", which is intentionally permissive here since
    // real callers only need the change classification, not rename pairs.
    let entries = parse_name_status(raw);
    assert_eq!(entries[0].change, ChangeKind::Modified);
  }

  #[test]
  fn diff_paths_rejects_invalid_ref() {
    let dir = std::env::temp_dir();
    let err = diff_paths(&dir, "-rf", "main").unwrap_err();
    assert!(matches!(err, Error::Vcs(_)));
  }
}
