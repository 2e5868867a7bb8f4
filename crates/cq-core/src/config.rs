use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::validation::{validate_dataset_id, validate_glob_pattern, ValidationError};

/// Schema version of the on-disk config, per spec.md §4.9. `V1` is migrated
/// forward in memory on load; migrations are deterministic and additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigVersion {
  V1,
  V2,
}

impl ConfigVersion {
  pub const CURRENT: ConfigVersion = ConfigVersion::V2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
  PreCommit,
  PostMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookMode {
  Manual,
  Auto,
}

/// One entry of `git_hooks[]` (spec.md §6 config file shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHookConfig {
  pub hook_type: HookKind,
  pub enabled: bool,
  pub mode: HookMode,
  pub dataset_name: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// The authoritative config shape at `<project>/.code-query/config.json`.
///
/// `V1` configs lack `sync_on_merge` (added in `V2`); `load` migrates them
/// in memory and the in-memory value is considered current regardless of
/// what's still on disk until the next `save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
  pub version: ConfigVersion,
  pub dataset_name: String,
  pub source_directory: String,
  #[serde(default)]
  pub exclude_patterns: Vec<String>,
  pub model: String,
  #[serde(default)]
  pub git_hooks: Vec<GitHookConfig>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default)]
  pub auto_sync: bool,
  #[serde(default)]
  pub sync_on_merge: bool,
  pub queue_batch_size: u32,
  pub analysis_timeout: u32,
}

/// Models the config layer is allowed to declare. Out-of-scope analyzer
/// implementations are not enumerated here by design (spec.md §1); this is
/// only the tag validated at config-write time.
pub const ALLOWED_MODELS: &[&str] = &["default", "fast", "thorough"];

impl ProjectConfig {
  pub fn new(dataset_name: impl Into<String>, source_directory: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      version: ConfigVersion::CURRENT,
      dataset_name: dataset_name.into(),
      source_directory: source_directory.into(),
      exclude_patterns: Vec::new(),
      model: "default".to_string(),
      git_hooks: Vec::new(),
      created_at: now,
      updated_at: now,
      auto_sync: false,
      sync_on_merge: false,
      queue_batch_size: 50,
      analysis_timeout: 60,
    }
  }

  /// Validation per spec.md §4.9: dataset name (C6 rules), source directory
  /// exists/readable, each exclude pattern compiles, numeric ranges.
  pub fn validate(&self, project_root: &Path) -> std::result::Result<(), ValidationError> {
    validate_dataset_id(&self.dataset_name).map_err(|e| ValidationError::new("dataset_name", e.message))?;

    let source_path = project_root.join(&self.source_directory);
    if !source_path.is_dir() {
      return Err(ValidationError::new(
        "source_directory",
        format!("`{}` does not exist or is not a directory", self.source_directory),
      ));
    }

    for pattern in &self.exclude_patterns {
      validate_glob_pattern(pattern).map_err(|e| ValidationError::new("exclude_patterns", e.message))?;
    }

    if !(1..=1000).contains(&self.queue_batch_size) {
      return Err(ValidationError::out_of_range("queue_batch_size", "must be in [1, 1000]"));
    }
    if !(10..=3600).contains(&self.analysis_timeout) {
      return Err(ValidationError::out_of_range("analysis_timeout", "must be in [10, 3600] seconds"));
    }
    if !ALLOWED_MODELS.contains(&self.model.as_str()) {
      return Err(ValidationError::new("model", format!("`{}` is not in the allowed model list", self.model)));
    }

    Ok(())
  }
}

/// On-disk path helpers, matching spec.md §6's `.code-query/` layout.
pub fn config_dir(project_root: &Path) -> PathBuf {
  project_root.join(".code-query")
}

pub fn config_path(project_root: &Path) -> PathBuf {
  config_dir(project_root).join("config.json")
}

pub fn backup_path(project_root: &Path) -> PathBuf {
  config_dir(project_root).join("config.json.backup")
}

/// A versioned envelope used only to read the `version` field before
/// committing to full deserialization, so a `V1` document that is
/// otherwise well-formed doesn't fail just because `V2` fields are absent
/// (handled by `#[serde(default)]` above) but lets us log the migration.
#[derive(Deserialize)]
struct VersionProbe {
  version: ConfigVersion,
}

/// Load the project config, migrating `V1` → current in memory.
///
/// Corrupt JSON falls back to `config.json.backup`; if that also fails,
/// returns `Ok(None)` (spec.md §4.9: "if both fail, return null").
pub fn load(project_root: &Path) -> Result<Option<ProjectConfig>> {
  let primary = config_path(project_root);
  match read_config_file(&primary) {
    Ok(Some(cfg)) => return Ok(Some(cfg)),
    Ok(None) => return Ok(None),
    Err(e) => {
      warn!("config.json at {:?} is corrupt ({e}); falling back to backup", primary);
    }
  }

  let backup = backup_path(project_root);
  match read_config_file(&backup) {
    Ok(cfg) => Ok(cfg),
    Err(e) => {
      warn!("config.json.backup at {:?} is also corrupt ({e}); returning none", backup);
      Ok(None)
    }
  }
}

fn read_config_file(path: &Path) -> Result<Option<ProjectConfig>> {
  if !path.exists() {
    return Ok(None);
  }
  let raw = fs::read_to_string(path)?;
  let probe: VersionProbe = serde_json::from_str(&raw).map_err(|e| Error::storage(format!("malformed config at {path:?}: {e}")))?;
  let cfg: ProjectConfig = serde_json::from_str(&raw).map_err(|e| Error::storage(format!("malformed config at {path:?}: {e}")))?;
  if probe.version < ConfigVersion::CURRENT {
    debug!("migrating config at {:?} from {:?} to {:?} in memory", path, probe.version, ConfigVersion::CURRENT);
  }
  Ok(Some(migrate(cfg)))
}

/// `V1` → `V2`: additive only. `sync_on_merge` defaults to `false` via
/// `#[serde(default)]`, so the only work here is stamping the version tag
/// forward so a subsequent `save` persists `V2`.
fn migrate(mut cfg: ProjectConfig) -> ProjectConfig {
  if cfg.version == ConfigVersion::V1 {
    cfg.version = ConfigVersion::V2;
  }
  cfg
}

/// Save atomically: write to a temp file then rename, preceded by copying
/// the current config to `.backup` (spec.md §4.9).
pub fn save(project_root: &Path, cfg: &ProjectConfig) -> Result<()> {
  let dir = config_dir(project_root);
  fs::create_dir_all(&dir)?;

  let target = config_path(project_root);
  if target.exists() {
    fs::copy(&target, backup_path(project_root))?;
  }

  let tmp = dir.join("config.json.tmp");
  let serialized = serde_json::to_string_pretty(cfg).map_err(|e| Error::storage(e.to_string()))?;
  fs::write(&tmp, serialized)?;
  fs::rename(&tmp, &target)?;
  Ok(())
}

/// Checklist of setup steps still pending (spec.md §4.9 `recommend_setup`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupChecklist {
  pub create_config: bool,
  pub document_directory: bool,
  pub install_hook: bool,
  pub migrate_config: bool,
}

impl SetupChecklist {
  pub fn is_ready(&self) -> bool {
    !self.create_config && !self.document_directory && !self.install_hook && !self.migrate_config
  }
}

pub fn recommend_setup(project_root: &Path, cfg: Option<&ProjectConfig>, files_documented: bool, hook_installed: bool) -> SetupChecklist {
  match cfg {
    None => SetupChecklist {
      create_config: true,
      document_directory: true,
      install_hook: true,
      migrate_config: false,
    },
    Some(cfg) => {
      let needs_migration = raw_version_on_disk(project_root).map(|v| v < ConfigVersion::CURRENT).unwrap_or(false);
      SetupChecklist {
        create_config: false,
        document_directory: !files_documented,
        install_hook: !hook_installed,
        migrate_config: needs_migration,
      }
    }
  }
}

fn raw_version_on_disk(project_root: &Path) -> Option<ConfigVersion> {
  let raw = fs::read_to_string(config_path(project_root)).ok()?;
  let probe: VersionProbe = serde_json::from_str(&raw).ok()?;
  Some(probe.version)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn make_project(dir: &Path) {
    fs::create_dir_all(dir.join("src")).unwrap();
  }

  #[test]
  fn save_then_load_roundtrips() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    let cfg = ProjectConfig::new("core", "src");
    save(tmp.path(), &cfg).unwrap();

    let loaded = load(tmp.path()).unwrap().unwrap();
    assert_eq!(loaded.dataset_name, "core");
    assert_eq!(loaded.version, ConfigVersion::CURRENT);
  }

  #[test]
  fn save_writes_backup_of_previous() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    let mut cfg = ProjectConfig::new("core", "src");
    save(tmp.path(), &cfg).unwrap();

    cfg.dataset_name = "renamed".to_string();
    save(tmp.path(), &cfg).unwrap();

    assert!(backup_path(tmp.path()).exists());
    let backup_raw = fs::read_to_string(backup_path(tmp.path())).unwrap();
    assert!(backup_raw.contains("\"core\""));
  }

  #[test]
  fn corrupt_primary_falls_back_to_backup() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    let cfg = ProjectConfig::new("core", "src");
    save(tmp.path(), &cfg).unwrap();
    // second save creates a valid backup of the first save
    let mut cfg2 = cfg.clone();
    cfg2.dataset_name = "second".to_string();
    save(tmp.path(), &cfg2).unwrap();

    fs::write(config_path(tmp.path()), "{ not json").unwrap();

    let loaded = load(tmp.path()).unwrap().unwrap();
    assert_eq!(loaded.dataset_name, "core");
  }

  #[test]
  fn both_corrupt_returns_none() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    fs::create_dir_all(config_dir(tmp.path())).unwrap();
    fs::write(config_path(tmp.path()), "{ nope").unwrap();
    fs::write(backup_path(tmp.path()), "{ also nope").unwrap();

    assert!(load(tmp.path()).unwrap().is_none());
  }

  #[test]
  fn validate_rejects_bad_dataset_name() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    let mut cfg = ProjectConfig::new("files", "src");
    assert!(cfg.validate(tmp.path()).is_err());
    cfg.dataset_name = "core".to_string();
    assert!(cfg.validate(tmp.path()).is_ok());
  }

  #[test]
  fn validate_rejects_missing_source_dir() {
    let tmp = TempDir::new().unwrap();
    let cfg = ProjectConfig::new("core", "does-not-exist");
    assert!(cfg.validate(tmp.path()).is_err());
  }

  #[test]
  fn validate_rejects_out_of_range_batch_size() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    let mut cfg = ProjectConfig::new("core", "src");
    cfg.queue_batch_size = 0;
    assert!(cfg.validate(tmp.path()).is_err());
    cfg.queue_batch_size = 50;
    cfg.analysis_timeout = 5;
    assert!(cfg.validate(tmp.path()).is_err());
  }

  #[test]
  fn recommend_setup_reports_missing_config() {
    let tmp = TempDir::new().unwrap();
    let checklist = recommend_setup(tmp.path(), None, false, false);
    assert!(checklist.create_config);
    assert!(!checklist.is_ready());
  }

  #[test]
  fn recommend_setup_ready_when_all_present() {
    let tmp = TempDir::new().unwrap();
    make_project(tmp.path());
    let cfg = ProjectConfig::new("core", "src");
    save(tmp.path(), &cfg).unwrap();
    let loaded = load(tmp.path()).unwrap().unwrap();
    let checklist = recommend_setup(tmp.path(), Some(&loaded), true, true);
    assert!(checklist.is_ready());
  }
}
