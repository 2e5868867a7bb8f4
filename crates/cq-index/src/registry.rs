use std::fs;
use std::path::Path;

use cq_core::FileAnalysis;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::classify::classify;

#[derive(Error, Debug)]
pub enum AnalyzerError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("analysis failed: {0}")]
  Failed(String),
}

/// External collaborator contract (spec.md §4.7 "AnalyzerRegistry
/// contract"). Real analyzers (tree-sitter parsers, LLM-backed summarizers,
/// etc.) live outside this crate; this crate only defines and drives the
/// contract.
pub trait Analyzer: Send + Sync {
  fn can_analyze(&self, path: &Path) -> bool;
  fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalyzerError>;
}

/// Ordered list of analyzers with a fallback always appended last (spec.md
/// §4.7: "a fallback analyzer returning minimal metadata is always last").
pub struct AnalyzerRegistry {
  analyzers: Vec<Box<dyn Analyzer>>,
}

impl Default for AnalyzerRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl AnalyzerRegistry {
  pub fn new() -> Self {
    Self { analyzers: Vec::new() }
  }

  /// Register an analyzer; registration order is the dispatch order
  /// (spec.md "Registry iterates in registration order").
  pub fn register(&mut self, analyzer: Box<dyn Analyzer>) {
    self.analyzers.push(analyzer);
  }

  pub fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalyzerError> {
    for analyzer in &self.analyzers {
      if analyzer.can_analyze(path) {
        return analyzer.analyze(path);
      }
    }
    FallbackAnalyzer.analyze(path)
  }
}

/// Minimal metadata analyzer: reads the file, records its extension-derived
/// language tag as the overview, and stores the raw content plus a SHA-256
/// hash. Always accepts (spec.md "fallback analyzer returning minimal
/// metadata is always last").
pub struct FallbackAnalyzer;

impl Analyzer for FallbackAnalyzer {
  fn can_analyze(&self, _path: &Path) -> bool {
    true
  }

  fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalyzerError> {
    let content = fs::read_to_string(path).map_err(AnalyzerError::Io)?;
    let language = classify(path);
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let content_hash = hex::encode(hasher.finalize());

    let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    Ok(FileAnalysis {
      filepath: path.to_string_lossy().to_string(),
      filename,
      language: language.to_string(),
      overview: format!("{language} source file"),
      ddd_context: None,
      functions: None,
      exports: None,
      imports: None,
      types_interfaces_classes: None,
      constants: None,
      dependencies: Vec::new(),
      other_notes: Vec::new(),
      full_content: Some(content),
      content_hash,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn fallback_analyzer_always_accepts() {
    assert!(FallbackAnalyzer.can_analyze(Path::new("anything.xyz")));
  }

  #[test]
  fn fallback_analyzer_hashes_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.rs");
    fs::write(&path, "fn a() {}").unwrap();

    let analysis = FallbackAnalyzer.analyze(&path).unwrap();
    assert_eq!(analysis.language, "rust");
    assert_eq!(analysis.content_hash.len(), 64);
    assert_eq!(analysis.full_content.unwrap(), "fn a() {}");
  }

  struct AlwaysFailsOnRust;
  impl Analyzer for AlwaysFailsOnRust {
    fn can_analyze(&self, path: &Path) -> bool {
      path.extension().and_then(|e| e.to_str()) == Some("rs")
    }
    fn analyze(&self, _path: &Path) -> Result<FileAnalysis, AnalyzerError> {
      Err(AnalyzerError::Failed("boom".to_string()))
    }
  }

  #[test]
  fn registry_dispatches_in_registration_order() {
    let dir = TempDir::new().unwrap();
    let rs_path = dir.path().join("a.rs");
    let py_path = dir.path().join("b.py");
    fs::write(&rs_path, "fn a() {}").unwrap();
    fs::write(&py_path, "def b(): pass").unwrap();

    let mut registry = AnalyzerRegistry::new();
    registry.register(Box::new(AlwaysFailsOnRust));

    assert!(registry.analyze(&rs_path).is_err());
    assert!(registry.analyze(&py_path).is_ok());
  }
}
