use std::path::Path;

use cq_core::{Dataset, DatasetType, FileDoc, SearchHit};
use rusqlite::Transaction;

use crate::datasets::{self, DatasetStatistics};
use crate::error::{DbError, DbResult};
use crate::files::{self, BatchResult};
use crate::migrations;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::schema;
use crate::search;

#[derive(Debug, Clone, Copy, Default)]
pub struct BackendConfig {
  pub pool: PoolConfig,
}

/// The domain-oriented Storage Backend (spec.md C4): a single handle other
/// crates hold, fronting the connection pool, migrations, and the full CRUD
/// + search + dataset-metadata surface. Every multi-step operation that
/// needs atomicity goes through `transaction`.
pub struct Backend {
  pool: ConnectionPool,
}

impl Backend {
  /// Open (creating if absent) the database at `path`, running any pending
  /// migrations before returning (spec.md §7: "Migration failure halts
  /// startup").
  pub fn open(path: &Path, config: BackendConfig) -> DbResult<Self> {
    let pool = ConnectionPool::open(path, config.pool)?;
    let mut conn = pool.get()?;
    migrations::run_migrations(&mut conn)?;
    Ok(Self { pool })
  }

  pub fn open_in_memory(config: BackendConfig) -> DbResult<Self> {
    let pool = ConnectionPool::open_in_memory(config.pool)?;
    let mut conn = pool.get()?;
    migrations::run_migrations(&mut conn)?;
    Ok(Self { pool })
  }

  /// Run `f` inside a single transaction (spec.md C4 `transaction()`
  /// "scoped handle"; all multi-step ops use it, e.g. fork/sync in
  /// `cq-dataset`).
  pub fn transaction<T>(&self, f: impl FnOnce(&Transaction) -> DbResult<T>) -> DbResult<T> {
    let mut conn = self.pool.get()?;
    let tx = conn.transaction().map_err(DbError::Sqlite)?;
    let result = f(&tx)?;
    tx.commit().map_err(DbError::Sqlite)?;
    Ok(result)
  }

  pub fn search_metadata(&self, fts_query: &str, dataset: &str, limit: u32, timeout_ms: u64) -> DbResult<Vec<SearchHit>> {
    let conn = self.pool.get()?;
    search::search_metadata(&conn, fts_query, dataset, limit, timeout_ms)
  }

  pub fn search_content(&self, fts_query: &str, dataset: &str, limit: u32, include_snippets: bool, timeout_ms: u64) -> DbResult<Vec<SearchHit>> {
    let conn = self.pool.get()?;
    search::search_content(&conn, fts_query, dataset, limit, include_snippets, timeout_ms)
  }

  pub fn search_unified(&self, content_q: &str, metadata_q: &str, dataset: &str, limit: u32, timeout_ms: u64) -> DbResult<Vec<SearchHit>> {
    let conn = self.pool.get()?;
    search::search_unified(&conn, content_q, metadata_q, dataset, limit, timeout_ms)
  }

  pub fn get_file_documentation(&self, filepath: &str, dataset: &str, include_content: bool) -> DbResult<Option<FileDoc>> {
    let conn = self.pool.get()?;
    files::get_file_documentation(&conn, filepath, dataset, include_content)
  }

  pub fn insert_documentation(&self, doc: &FileDoc) -> DbResult<bool> {
    let conn = self.pool.get()?;
    let ok = files::insert_documentation(&conn, doc)?;
    datasets::recompute_files_count(&conn, &doc.dataset)?;
    Ok(ok)
  }

  pub fn insert_documentation_batch(&self, docs: &[FileDoc]) -> DbResult<BatchResult> {
    let mut conn = self.pool.get()?;
    let result = files::insert_documentation_batch(&mut conn, docs)?;
    let mut datasets_touched: Vec<&str> = docs.iter().map(|d| d.dataset.as_str()).collect();
    datasets_touched.sort_unstable();
    datasets_touched.dedup();
    for id in datasets_touched {
      datasets::recompute_files_count(&conn, id)?;
    }
    Ok(result)
  }

  pub fn update_documentation(&self, filepath: &str, dataset: &str, updates: &serde_json::Map<String, serde_json::Value>) -> DbResult<bool> {
    let conn = self.pool.get()?;
    files::update_documentation(&conn, filepath, dataset, updates)
  }

  pub fn delete_documentation(&self, filepath: &str, dataset: &str) -> DbResult<bool> {
    let conn = self.pool.get()?;
    let removed = files::delete_documentation(&conn, filepath, dataset)?;
    if removed {
      datasets::recompute_files_count(&conn, dataset)?;
    }
    Ok(removed)
  }

  pub fn delete_all_documentation(&self, dataset: &str) -> DbResult<usize> {
    let conn = self.pool.get()?;
    let count = files::delete_all_documentation(&conn, dataset)?;
    datasets::recompute_files_count(&conn, dataset)?;
    Ok(count)
  }

  pub fn get_dataset_files(&self, dataset: &str) -> DbResult<Vec<String>> {
    let conn = self.pool.get()?;
    files::get_dataset_files(&conn, dataset)
  }

  pub fn get_dataset_metadata(&self, id: &str) -> DbResult<Option<Dataset>> {
    let conn = self.pool.get()?;
    datasets::get_dataset_metadata(&conn, id)
  }

  pub fn list_datasets(&self, parent_id: Option<&str>, dataset_type: Option<DatasetType>) -> DbResult<Vec<Dataset>> {
    let conn = self.pool.get()?;
    datasets::list_datasets(&conn, parent_id, dataset_type)
  }

  pub fn create_dataset(&self, id: &str, source_dir: &str, dataset_type: DatasetType, parent_id: Option<&str>, source_branch: Option<&str>) -> DbResult<bool> {
    let conn = self.pool.get()?;
    datasets::create_dataset(&conn, id, source_dir, dataset_type, parent_id, source_branch)
  }

  pub fn delete_dataset(&self, id: &str) -> DbResult<bool> {
    let mut conn = self.pool.get()?;
    datasets::delete_dataset(&mut conn, id)
  }

  pub fn get_dataset_statistics(&self, dataset: &str) -> DbResult<DatasetStatistics> {
    let conn = self.pool.get()?;
    datasets::get_dataset_statistics(&conn, dataset)
  }

  /// Apply the tokenizer safe-swap migration (spec.md §4.4) against the
  /// pool's underlying database.
  pub fn upgrade_tokenizer(&self, new_token_chars: &str) -> DbResult<()> {
    let mut conn = self.pool.get()?;
    migrations::safe_swap_fts_tokenizer(&mut conn, new_token_chars)
  }

  pub fn full_content_fts_column_index(&self) -> usize {
    schema::FULL_CONTENT_FTS_COLUMN_INDEX
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn sample_doc(filepath: &str, dataset: &str) -> FileDoc {
    FileDoc {
      filepath: filepath.to_string(),
      filename: filepath.to_string(),
      dataset: dataset.to_string(),
      overview: "overview".to_string(),
      ddd_context: None,
      functions: None,
      exports: None,
      imports: None,
      types_interfaces_classes: None,
      constants: None,
      dependencies: vec![],
      other_notes: vec![],
      full_content: Some("fn validate_token() {}".to_string()),
      content_hash: "h1".to_string(),
      documented_at_commit: None,
      documented_at: Utc::now(),
    }
  }

  #[test]
  fn open_in_memory_runs_migrations() {
    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", "/tmp/src", DatasetType::Main, None, None).unwrap();
    assert!(backend.get_dataset_metadata("core").unwrap().is_some());
  }

  #[test]
  fn insert_updates_files_count() {
    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", "/tmp/src", DatasetType::Main, None, None).unwrap();
    backend.insert_documentation(&sample_doc("a.rs", "core")).unwrap();
    let ds = backend.get_dataset_metadata("core").unwrap().unwrap();
    assert_eq!(ds.files_count, 1);
  }

  #[test]
  fn transaction_rolls_back_on_error() {
    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", "/tmp/src", DatasetType::Main, None, None).unwrap();
    let result: DbResult<()> = backend.transaction(|tx| {
      files::insert_documentation(tx, &sample_doc("a.rs", "core"))?;
      Err(DbError::Storage("boom".to_string()))
    });
    assert!(result.is_err());
    assert!(backend.get_dataset_files("core").unwrap().is_empty());
  }

  #[test]
  fn search_unified_round_trips_through_backend() {
    let backend = Backend::open_in_memory(BackendConfig::default()).unwrap();
    backend.create_dataset("core", "/tmp/src", DatasetType::Main, None, None).unwrap();
    backend.insert_documentation(&sample_doc("src/auth/login.py", "core")).unwrap();
    let hits = backend.search_unified("validate_token", "validate_token", "core", 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
  }
}
