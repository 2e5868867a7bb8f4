use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use cq_core::FileDoc;
use cq_db::Backend;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::discovery::{self, DiscoveredFile, DiscoveryConfig};
use crate::error::IndexResult;
use crate::registry::AnalyzerRegistry;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub discovery: DiscoveryConfig,
  pub batch_size: usize,
  /// If false, a file whose path already has a row in the dataset is
  /// skipped without re-analyzing it (spec.md §4.7 step 4).
  pub update_existing: bool,
  /// Size of the bounded thread pool the analyze stage runs within
  /// (spec.md §4.7 step 3 "bounded parallel analysis", §5 "parallel
  /// worker tasks over a bounded thread pool"). Discovery has its own
  /// `workers` knob; this is the pool CPU-bound analyzers run under.
  pub max_workers: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      discovery: DiscoveryConfig::default(),
      batch_size: 50,
      update_existing: true,
      max_workers: 4,
    }
  }
}

/// Cooperative cancellation flag, polled between files and batches (spec.md
/// §4.7 step 6). In-flight analyses finish; their results are discarded
/// rather than interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Immutable point-in-time view of pipeline progress (spec.md §4.7 step 5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
  pub total: u64,
  pub processed: u64,
  pub successful: u64,
  pub failed: u64,
  pub skipped: u64,
  pub current_file: Option<String>,
  pub errors: Vec<String>,
}

/// Atomic counters shared across the pipeline run; `snapshot()` returns an
/// immutable copy so callers never observe a torn read (spec.md §4.7:
/// "Snapshots are returned as immutable copies").
#[derive(Debug, Default)]
pub struct Progress {
  total: AtomicU64,
  processed: AtomicU64,
  successful: AtomicU64,
  failed: AtomicU64,
  skipped: AtomicU64,
  current_file: Mutex<Option<String>>,
  errors: Mutex<Vec<String>>,
}

impl Progress {
  pub fn new() -> Self {
    Self::default()
  }

  fn set_current_file(&self, path: &str) {
    *self.current_file.lock().unwrap() = Some(path.to_string());
  }

  fn push_error(&self, err: String) {
    self.errors.lock().unwrap().push(err);
  }

  pub fn snapshot(&self) -> ProgressSnapshot {
    ProgressSnapshot {
      total: self.total.load(Ordering::Relaxed),
      processed: self.processed.load(Ordering::Relaxed),
      successful: self.successful.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      skipped: self.skipped.load(Ordering::Relaxed),
      current_file: self.current_file.lock().unwrap().clone(),
      errors: self.errors.lock().unwrap().clone(),
    }
  }
}

/// Documentation Pipeline (spec.md C7): discover → classify (inside the
/// registry dispatch) → analyze → persist, reporting progress and honoring
/// cooperative cancellation throughout.
pub struct Pipeline<'a> {
  backend: &'a Backend,
  registry: &'a AnalyzerRegistry,
}

impl<'a> Pipeline<'a> {
  pub fn new(backend: &'a Backend, registry: &'a AnalyzerRegistry) -> Self {
    Self { backend, registry }
  }

  pub fn run(&self, dataset: &str, root: &Path, config: &PipelineConfig, progress: &Progress, cancel: &CancellationToken) -> IndexResult<()> {
    let files = discovery::discover(root, &config.discovery)?;
    progress.total.store(files.len() as u64, Ordering::Relaxed);

    let existing: HashSet<String> = if config.update_existing {
      HashSet::new()
    } else {
      self.backend.get_dataset_files(dataset)?.into_iter().collect()
    };

    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(config.max_workers.max(1))
      .build()
      .map_err(|e| crate::error::IndexError::InvalidGlob(format!("failed to build analysis thread pool: {e}")))?;

    for chunk in files.chunks(config.batch_size.max(1)) {
      if cancel.is_cancelled() {
        debug!(dataset, "pipeline cancelled before completion");
        break;
      }

      let to_analyze: Vec<&DiscoveredFile> = chunk
        .iter()
        .filter(|file| {
          if !config.update_existing && existing.contains(&file.relative_path) {
            progress.skipped.fetch_add(1, Ordering::Relaxed);
            progress.processed.fetch_add(1, Ordering::Relaxed);
            false
          } else {
            true
          }
        })
        .collect();

      // Bounded parallel analysis within this batch (spec.md §4.7 step 3):
      // each file is a CPU-bound analyzer call, dispatched across
      // `max_workers` threads, results collected back in file order.
      let analyzed: Vec<(&DiscoveredFile, Result<cq_core::FileAnalysis, crate::registry::AnalyzerError>)> = pool.install(|| {
        to_analyze
          .par_iter()
          .map(|file| {
            if cancel.is_cancelled() {
              return (*file, Err(crate::registry::AnalyzerError::Failed("cancelled".to_string())));
            }
            progress.set_current_file(&file.relative_path);
            (*file, self.registry.analyze(&file.absolute_path))
          })
          .collect()
      });

      if cancel.is_cancelled() {
        break;
      }

      let mut batch: Vec<FileDoc> = Vec::with_capacity(analyzed.len());
      for (file, result) in analyzed {
        match result {
          Ok(analysis) => batch.push(FileDoc {
            filepath: file.relative_path.clone(),
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
            documented_at_commit: None,
            documented_at: Utc::now(),
          }),
          Err(e) => {
            progress.failed.fetch_add(1, Ordering::Relaxed);
            progress.processed.fetch_add(1, Ordering::Relaxed);
            progress.push_error(format!("{}: {e}", file.relative_path));
          }
        }
      }

      if !batch.is_empty() {
        self.flush_batch(&mut batch, progress)?;
      }
    }

    Ok(())
  }

  fn flush_batch(&self, batch: &mut Vec<FileDoc>, progress: &Progress) -> IndexResult<()> {
    let count = batch.len() as u64;
    match self.backend.insert_documentation_batch(batch) {
      Ok(result) => {
        progress.successful.fetch_add(result.successful as u64, Ordering::Relaxed);
        progress.failed.fetch_add(result.failed as u64, Ordering::Relaxed);
        progress.processed.fetch_add(count, Ordering::Relaxed);
      }
      Err(e) => {
        warn!(error = %e, batch_size = count, "batch persist failed, rolled back");
        progress.failed.fetch_add(count, Ordering::Relaxed);
        progress.processed.fetch_add(count, Ordering::Relaxed);
        progress.push_error(format!("batch of {count} rolled back: {e}"));
      }
    }
    batch.clear();
    Ok(())
  }
}
