use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::{GitHookConfig, HookKind, HookMode};
use crate::error::{Error, Result};
use crate::vcs;

/// Marker line written into every hook script this crate installs, so a
/// later install can tell "ours, safe to overwrite" from "someone else's
/// hook, back it up first" (spec.md §4.9).
pub const HOOK_MARKER: &str = "# managed-by: code-query";

fn hook_filename(kind: HookKind) -> &'static str {
  match kind {
    HookKind::PreCommit => "pre-commit",
    HookKind::PostMerge => "post-merge",
  }
}

/// The hook script body. Invokes the CLI's `hook` subcommand and always
/// exits 0 (spec.md §6: "Hooks MUST exit 0 on any internal error" — the
/// exit code here is unconditional, real error handling happens inside the
/// `hook` subcommand itself, which swallows its own failures per §7).
fn hook_script(kind: HookKind, mode: HookMode, dataset_name: &str) -> String {
  let subcommand = hook_filename(kind);
  let mode_flag = match mode {
    HookMode::Manual => "manual",
    HookMode::Auto => "auto",
  };
  format!(
    "#!/bin/sh\n{HOOK_MARKER}\n# mode={mode_flag} dataset={dataset_name}\ncq-cli hook {subcommand} --dataset {dataset_name} --mode {mode_flag} || true\nexit 0\n"
  )
}

fn is_ours(path: &Path) -> bool {
  fs::read_to_string(path).map(|content| content.contains(HOOK_MARKER)).unwrap_or(false)
}

/// Resolve `<git-dir>/hooks`, creating it if missing. Uses
/// `vcs::git_dir`, never a literal `.git/hooks` join, so this works for
/// worktrees whose `.git` is a file (spec.md §4.9).
pub fn hooks_dir(project_root: &Path) -> Result<PathBuf> {
  let dir = vcs::git_dir(project_root)?.join("hooks");
  fs::create_dir_all(&dir)?;
  Ok(dir)
}

/// Install one git hook. Backs up a pre-existing hook that isn't ours
/// (no `HOOK_MARKER`) to a `.backup` suffix before overwriting.
pub fn install_hook(project_root: &Path, kind: HookKind, mode: HookMode, dataset_name: &str) -> Result<GitHookConfig> {
  let dir = hooks_dir(project_root)?;
  let target = dir.join(hook_filename(kind));

  if target.exists() && !is_ours(&target) {
    let backup = dir.join(format!("{}.backup", hook_filename(kind)));
    fs::copy(&target, &backup)?;
  }

  let script = hook_script(kind, mode, dataset_name);
  fs::write(&target, script)?;
  set_executable(&target)?;

  let now = Utc::now();
  Ok(GitHookConfig {
    hook_type: kind,
    enabled: true,
    mode,
    dataset_name: dataset_name.to_string(),
    created_at: now,
    updated_at: now,
  })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
  use std::os::unix::fs::PermissionsExt;
  let mut perms = fs::metadata(path)?.permissions();
  perms.set_mode(perms.mode() | 0o111);
  fs::set_permissions(path, perms)?;
  Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
  Ok(())
}

pub fn is_hook_installed(project_root: &Path, kind: HookKind) -> bool {
  match hooks_dir(project_root) {
    Ok(dir) => {
      let target = dir.join(hook_filename(kind));
      target.exists() && is_ours(&target)
    }
    Err(_) => false,
  }
}
