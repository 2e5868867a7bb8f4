use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use cq_core::QueueEntry;
use cq_db::Backend;
use cq_index::AnalyzerRegistry;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::queue;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub batch_size: usize,
  pub max_retries: u32,
  pub retry_delay: Duration,
  pub poll_interval: Duration,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      batch_size: 20,
      max_retries: 3,
      retry_delay: Duration::from_secs(2),
      poll_interval: Duration::from_secs(5),
    }
  }
}

/// Background Worker (spec.md §4.8): drains the queue file into the
/// documentation pipeline on a timer, with per-task retry.
pub struct Worker<'a> {
  project_root: PathBuf,
  backend: &'a Backend,
  registry: &'a AnalyzerRegistry,
  config: WorkerConfig,
}

impl<'a> Worker<'a> {
  pub fn new(project_root: impl Into<PathBuf>, backend: &'a Backend, registry: &'a AnalyzerRegistry, config: WorkerConfig) -> Self {
    Self {
      project_root: project_root.into(),
      backend,
      registry,
      config,
    }
  }

  pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut timer = interval(self.config.poll_interval);
    timer.tick().await;

    loop {
      tokio::select! {
        _ = timer.tick() => {
          if let Err(e) = self.drain_once().await {
            error!(error = %e, "worker batch drain failed");
          }
        }
        _ = shutdown_rx.recv() => {
          debug!("worker received shutdown signal");
          break;
        }
      }
    }
  }

  async fn drain_once(&mut self) -> crate::error::DaemonResult<()> {
    let batch = queue::drain(&self.project_root, self.config.batch_size)?;
    if batch.is_empty() {
      return Ok(());
    }
    info!(count = batch.len(), "draining queue batch");
    for entry in batch {
      self.process_with_retry(&entry).await;
    }
    Ok(())
  }

  async fn process_with_retry(&self, entry: &QueueEntry) {
    let mut attempt = 0;
    loop {
      match self.process_entry(entry) {
        Ok(()) => return,
        Err(e) => {
          attempt += 1;
          if attempt > self.config.max_retries {
            error!(filepath = entry.filepath.as_str(), error = %e, "giving up after max retries");
            return;
          }
          warn!(filepath = entry.filepath.as_str(), attempt, error = %e, "retrying after delay");
          tokio::time::sleep(self.config.retry_delay).await;
        }
      }
    }
  }

  fn process_entry(&self, entry: &QueueEntry) -> crate::error::DaemonResult<()> {
    let path = self.project_root.join(&entry.filepath);
    let analysis = self.registry.analyze(&path).map_err(|e| crate::error::DaemonError::Queue(e.to_string()))?;
    let doc = cq_core::FileDoc {
      filepath: entry.filepath.clone(),
      filename: analysis.filename,
      dataset: entry.dataset.clone(),
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
      documented_at_commit: entry.commit_hash.clone(),
      documented_at: Utc::now(),
    };
    self.backend.insert_documentation(&doc)?;
    Ok(())
  }
}

/// File name prefix passed to `tracing_appender::rolling::daily` for the
/// worker's log (spec.md §4.8 "logs to a rotating file"; spec.md §6 names
/// the file `worker.log` in the on-disk layout — the daily appender rolls
/// it to `worker.log.<date>` on rotation).
pub const WORKER_LOG_FILE_NAME: &str = "worker.log";

/// `.code-query/` (spec.md §6 on-disk layout), the directory
/// `tracing_appender::rolling::daily` rolls [`WORKER_LOG_FILE_NAME`] under.
pub fn log_dir(project_root: &Path) -> PathBuf {
  project_root.join(".code-query")
}
