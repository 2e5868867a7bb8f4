use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::error::{IndexError, IndexResult};

/// Directory names excluded from every walk regardless of user config
/// (spec.md §4.7 "default exclude set: version-control dirs, build outputs,
/// virtualenvs, binaries").
const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
  ".git", ".hg", ".svn", "node_modules", "target", "dist", "build", "__pycache__", ".venv", "venv", ".tox", ".mypy_cache", ".pytest_cache", "vendor",
  ".next", ".nuxt", ".cache",
];

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
  pub max_file_size: u64,
  pub follow_symlinks: bool,
  pub includes: Vec<String>,
  pub excludes: Vec<String>,
  /// Parallel top-level-subdirectory scan when > 1 (spec.md §4.7).
  pub workers: usize,
}

impl Default for DiscoveryConfig {
  fn default() -> Self {
    Self {
      max_file_size: 5 * 1024 * 1024,
      follow_symlinks: false,
      includes: Vec::new(),
      excludes: Vec::new(),
      workers: 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredFile {
  pub relative_path: String,
  pub absolute_path: PathBuf,
  pub size: u64,
}

/// First 8KB sniff for a NUL byte, the same heuristic grep/ripgrep use to
/// skip binaries without a fixed extension list.
fn looks_binary(path: &Path) -> bool {
  let Ok(bytes) = fs::read(path).map(|mut v| {
    v.truncate(8192);
    v
  }) else {
    return true;
  };
  bytes.contains(&0)
}

fn build_overrides(root: &Path, config: &DiscoveryConfig) -> IndexResult<ignore::overrides::Override> {
  let mut builder = OverrideBuilder::new(root);
  for pattern in &config.excludes {
    builder.add(&format!("!{pattern}")).map_err(|e| IndexError::InvalidGlob(e.to_string()))?;
  }
  for pattern in &config.includes {
    builder.add(pattern).map_err(|e| IndexError::InvalidGlob(e.to_string()))?;
  }
  builder.build().map_err(|e| IndexError::InvalidGlob(e.to_string()))
}

fn is_default_excluded(path: &Path) -> bool {
  path.components().any(|c| {
    let s = c.as_os_str().to_string_lossy();
    DEFAULT_EXCLUDED_DIRS.contains(&s.as_ref())
  })
}

fn walk_one(root: &Path, start: &Path, config: &DiscoveryConfig) -> IndexResult<Vec<DiscoveredFile>> {
  let overrides = build_overrides(root, config)?;
  let walker = WalkBuilder::new(start)
    .follow_links(config.follow_symlinks)
    .hidden(false)
    .git_ignore(true)
    .git_global(true)
    .git_exclude(true)
    .overrides(overrides)
    .build();

  let mut out = Vec::new();
  for entry in walker {
    let entry = entry.map_err(IndexError::Walk)?;
    let path = entry.path();
    if entry.file_type().is_none_or(|ft| !ft.is_file()) {
      continue;
    }
    if is_default_excluded(path) {
      continue;
    }
    let metadata = fs::metadata(path)?;
    if metadata.len() == 0 || metadata.len() > config.max_file_size {
      continue;
    }
    if looks_binary(path) {
      continue;
    }
    let relative_path = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
    out.push(DiscoveredFile {
      relative_path,
      absolute_path: path.to_path_buf(),
      size: metadata.len(),
    });
  }
  Ok(out)
}

/// Recursive discovery honoring the default and user-supplied exclude sets
/// plus user includes, producing a deterministically ordered file list
/// (spec.md §4.7 step 1). When `config.workers > 1`, top-level
/// subdirectories are scanned in parallel.
pub fn discover(root: &Path, config: &DiscoveryConfig) -> IndexResult<Vec<DiscoveredFile>> {
  if config.workers <= 1 {
    let mut files = walk_one(root, root, config)?;
    files.sort();
    return Ok(files);
  }

  let top_level: Vec<PathBuf> = fs::read_dir(root)?
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
    .map(|e| e.path())
    .filter(|p| !is_default_excluded(p))
    .collect();

  let mut nested: Vec<DiscoveredFile> = top_level
    .par_iter()
    .map(|dir| walk_one(root, dir, config))
    .collect::<IndexResult<Vec<Vec<DiscoveredFile>>>>()?
    .into_iter()
    .flatten()
    .collect();

  // Files directly under root (not in any subdirectory) are single-threaded.
  let mut direct = Vec::new();
  for entry in fs::read_dir(root)?.filter_map(|e| e.ok()) {
    if entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
      let path = entry.path();
      if let Some(mut file) = walk_one(root, &path, config)?.into_iter().next() {
        file.absolute_path = path;
        direct.push(file);
      }
    }
  }

  nested.append(&mut direct);
  nested.sort();
  Ok(nested)
}
