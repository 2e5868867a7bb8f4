use chrono::{DateTime, Utc};
use cq_core::{Dataset, DatasetType};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbError, DbResult};

fn row_to_dataset(row: &Row) -> rusqlite::Result<Dataset> {
  let type_str: String = row.get("dataset_type")?;
  let dataset_type = DatasetType::parse(&type_str).unwrap_or(DatasetType::Main);
  Ok(Dataset {
    id: row.get("dataset_id")?,
    source_dir: row.get("source_dir")?,
    files_count: row.get::<_, i64>("files_count")? as u64,
    loaded_at: row.get("loaded_at")?,
    updated_at: row.get("updated_at")?,
    dataset_type,
    parent_dataset_id: row.get("parent_dataset_id")?,
    source_branch: row.get("source_branch")?,
  })
}

const SELECT_COLUMNS: &str = "dataset_id, source_dir, files_count, loaded_at, updated_at, dataset_type, parent_dataset_id, source_branch";

/// Enforces uniqueness; name validation and type/parent consistency
/// (spec.md I5, I7) are expected to have run in `cq-dataset` before this
/// is called — this layer only enforces what the schema itself can
/// (PRIMARY KEY uniqueness, FK existence of `parent_dataset_id`).
pub fn create_dataset(
  conn: &Connection,
  id: &str,
  source_dir: &str,
  dataset_type: DatasetType,
  parent_id: Option<&str>,
  source_branch: Option<&str>,
) -> DbResult<bool> {
  let existing = get_dataset_metadata(conn, id)?;
  if existing.is_some() {
    return Err(DbError::Conflict(format!("dataset `{id}` already exists")));
  }

  let now = Utc::now();
  conn.execute(
    r#"INSERT INTO dataset_metadata
       (dataset_id, source_dir, files_count, loaded_at, updated_at, dataset_type, parent_dataset_id, source_branch)
       VALUES (?1, ?2, 0, ?3, ?3, ?4, ?5, ?6)"#,
    params![id, source_dir, now, dataset_type.as_str(), parent_id, source_branch],
  )?;
  Ok(true)
}

pub fn get_dataset_metadata(conn: &Connection, id: &str) -> DbResult<Option<Dataset>> {
  let sql = format!("SELECT {SELECT_COLUMNS} FROM dataset_metadata WHERE dataset_id = ?1");
  conn.query_row(&sql, params![id], row_to_dataset).optional().map_err(DbError::Sqlite)
}

pub fn list_datasets(conn: &Connection, parent_id: Option<&str>, dataset_type: Option<DatasetType>) -> DbResult<Vec<Dataset>> {
  let sql = format!("SELECT {SELECT_COLUMNS} FROM dataset_metadata WHERE (?1 IS NULL OR parent_dataset_id = ?1) AND (?2 IS NULL OR dataset_type = ?2) ORDER BY dataset_id");
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt.query_map(params![parent_id, dataset_type.map(|t| t.as_str())], row_to_dataset)?;
  rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::Sqlite)
}

/// Refresh the denormalized `files_count` after a batch write.
pub fn recompute_files_count(conn: &Connection, id: &str) -> DbResult<u64> {
  let count: i64 = conn.query_row("SELECT count(*) FROM files WHERE dataset = ?1", params![id], |r| r.get(0))?;
  conn.execute(
    "UPDATE dataset_metadata SET files_count = ?1, updated_at = ?2 WHERE dataset_id = ?3",
    params![count, Utc::now(), id],
  )?;
  Ok(count as u64)
}

/// Cascades to `files` (ON DELETE CASCADE) within one transaction
/// (spec.md I3, C4 `delete_dataset`). Queue-entry cleanup for this
/// dataset is a file-based concern handled by `cq-dataset` immediately
/// alongside this call, since the queue lives in `file_queue.json`, not
/// in this database (see spec.md §4.8/§6) — see DESIGN.md for the
/// resulting non-atomicity tradeoff.
pub fn delete_dataset(conn: &mut Connection, id: &str) -> DbResult<bool> {
  let tx = conn.transaction().map_err(DbError::Sqlite)?;
  let affected = tx.execute("DELETE FROM dataset_metadata WHERE dataset_id = ?1", params![id])?;
  tx.commit().map_err(DbError::Sqlite)?;
  Ok(affected > 0)
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DatasetStatistics {
  pub total_files: u64,
  pub total_size_bytes: u64,
  pub by_extension: std::collections::BTreeMap<String, u64>,
  pub largest_files: Vec<(String, u64)>,
}

/// Computed via aggregate SQL — never N+1 (spec.md C4
/// `get_dataset_statistics`).
pub fn get_dataset_statistics(conn: &Connection, dataset: &str) -> DbResult<DatasetStatistics> {
  let total_files: i64 = conn.query_row("SELECT count(*) FROM files WHERE dataset = ?1", params![dataset], |r| r.get(0))?;
  let total_size_bytes: i64 = conn.query_row(
    "SELECT coalesce(sum(length(coalesce(full_content, ''))), 0) FROM files WHERE dataset = ?1",
    params![dataset],
    |r| r.get(0),
  )?;

  let mut by_extension = std::collections::BTreeMap::new();
  {
    let mut stmt = conn.prepare(
      "SELECT lower(coalesce(substr(filename, instr(filename, '.') + 1), '')) AS ext, count(*) \
       FROM files WHERE dataset = ?1 GROUP BY ext",
    )?;
    let rows = stmt.query_map(params![dataset], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?;
    for row in rows {
      let (ext, count) = row.map_err(DbError::Sqlite)?;
      by_extension.insert(ext, count);
    }
  }

  let mut largest_files = Vec::new();
  {
    let mut stmt = conn.prepare(
      "SELECT filepath, length(coalesce(full_content, '')) AS sz FROM files WHERE dataset = ?1 ORDER BY sz DESC LIMIT 10",
    )?;
    let rows = stmt.query_map(params![dataset], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?;
    for row in rows {
      largest_files.push(row.map_err(DbError::Sqlite)?);
    }
  }

  Ok(DatasetStatistics {
    total_files: total_files as u64,
    total_size_bytes: total_size_bytes as u64,
    by_extension,
    largest_files,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::files::insert_documentation;
  use crate::schema;

  fn sample_doc(filepath: &str, content: &str) -> cq_core::FileDoc {
    cq_core::FileDoc {
      filepath: filepath.to_string(),
      filename: filepath.to_string(),
      dataset: "core".to_string(),
      overview: String::new(),
      ddd_context: None,
      functions: None,
      exports: None,
      imports: None,
      types_interfaces_classes: None,
      constants: None,
      dependencies: vec![],
      other_notes: vec![],
      full_content: Some(content.to_string()),
      content_hash: "h".to_string(),
      documented_at_commit: None,
      documented_at: Utc::now(),
    }
  }

  fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    schema::create_all(&conn).unwrap();
    conn
  }

  #[test]
  fn create_then_get_roundtrips() {
    let conn = setup();
    create_dataset(&conn, "core", "/tmp/src", DatasetType::Main, None, None).unwrap();
    let ds = get_dataset_metadata(&conn, "core").unwrap().unwrap();
    assert_eq!(ds.id, "core");
    assert_eq!(ds.dataset_type, DatasetType::Main);
  }

  #[test]
  fn create_rejects_duplicate() {
    let conn = setup();
    create_dataset(&conn, "core", "/tmp", DatasetType::Main, None, None).unwrap();
    let err = create_dataset(&conn, "core", "/tmp", DatasetType::Main, None, None).unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
  }

  #[test]
  fn delete_cascades_to_files() {
    let mut conn = setup();
    create_dataset(&conn, "core", "/tmp", DatasetType::Main, None, None).unwrap();
    insert_documentation(&conn, &sample_doc("a.rs", "x")).unwrap();
    delete_dataset(&mut conn, "core").unwrap();
    let count: i64 = conn.query_row("SELECT count(*) FROM files WHERE dataset = 'core'", [], |r| r.get(0)).unwrap();
    assert_eq!(count, 0);
    assert!(get_dataset_metadata(&conn, "core").unwrap().is_none());
  }

  #[test]
  fn list_filters_by_parent_and_type() {
    let conn = setup();
    create_dataset(&conn, "core", "/tmp", DatasetType::Main, None, None).unwrap();
    create_dataset(&conn, "core__wt_feature", "/tmp2", DatasetType::Worktree, Some("core"), Some("feature")).unwrap();

    let children = list_datasets(&conn, Some("core"), None).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, "core__wt_feature");

    let worktrees = list_datasets(&conn, None, Some(DatasetType::Worktree)).unwrap();
    assert_eq!(worktrees.len(), 1);
  }

  #[test]
  fn statistics_are_aggregated() {
    let conn = setup();
    create_dataset(&conn, "core", "/tmp", DatasetType::Main, None, None).unwrap();
    insert_documentation(&conn, &sample_doc("a.rs", "12345")).unwrap();
    insert_documentation(&conn, &sample_doc("b.rs", "123")).unwrap();

    let stats = get_dataset_statistics(&conn, "core").unwrap();
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.total_size_bytes, 8);
    assert_eq!(stats.by_extension.get("rs"), Some(&2));
  }
}
