use chrono::{DateTime, Utc};
use cq_core::{FileDoc, StructuredBlob, UPDATABLE_FILEDOC_FIELDS};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::error::{DbError, DbResult};

fn blob_to_json(blob: &Option<StructuredBlob>) -> Option<String> {
  blob.as_ref().map(|b| serde_json::to_string(b).unwrap_or_default())
}

fn json_to_blob(raw: Option<String>) -> DbResult<Option<StructuredBlob>> {
  match raw {
    None => Ok(None),
    Some(s) => serde_json::from_str(&s).map_err(|e| DbError::Validation(format!("corrupt structured blob: {e}"))),
  }
}

fn row_to_filedoc(row: &Row) -> rusqlite::Result<FileDocRaw> {
  Ok(FileDocRaw {
    filepath: row.get("filepath")?,
    filename: row.get("filename")?,
    dataset: row.get("dataset")?,
    overview: row.get("overview")?,
    ddd_context: row.get("ddd_context")?,
    functions: row.get("functions")?,
    exports: row.get("exports")?,
    imports: row.get("imports")?,
    types_interfaces_classes: row.get("types_interfaces_classes")?,
    constants: row.get("constants")?,
    dependencies: row.get("dependencies")?,
    other_notes: row.get("other_notes")?,
    full_content: row.get("full_content")?,
    content_hash: row.get("content_hash")?,
    documented_at_commit: row.get("documented_at_commit")?,
    documented_at: row.get("documented_at")?,
  })
}

/// Intermediate row shape with JSON-text columns still unparsed, so the
/// conversion into `FileDoc` can fail with a typed error instead of
/// panicking inside the `rusqlite::Row` closure.
struct FileDocRaw {
  filepath: String,
  filename: String,
  dataset: String,
  overview: String,
  ddd_context: Option<String>,
  functions: Option<String>,
  exports: Option<String>,
  imports: Option<String>,
  types_interfaces_classes: Option<String>,
  constants: Option<String>,
  dependencies: String,
  other_notes: String,
  full_content: Option<String>,
  content_hash: String,
  documented_at_commit: Option<String>,
  documented_at: DateTime<Utc>,
}

impl FileDocRaw {
  fn into_filedoc(self) -> DbResult<FileDoc> {
    Ok(FileDoc {
      filepath: self.filepath,
      filename: self.filename,
      dataset: self.dataset,
      overview: self.overview,
      ddd_context: self.ddd_context,
      functions: json_to_blob(self.functions)?,
      exports: json_to_blob(self.exports)?,
      imports: json_to_blob(self.imports)?,
      types_interfaces_classes: json_to_blob(self.types_interfaces_classes)?,
      constants: json_to_blob(self.constants)?,
      dependencies: serde_json::from_str(&self.dependencies).map_err(|e| DbError::Validation(e.to_string()))?,
      other_notes: serde_json::from_str(&self.other_notes).map_err(|e| DbError::Validation(e.to_string()))?,
      full_content: self.full_content,
      content_hash: self.content_hash,
      documented_at_commit: self.documented_at_commit,
      documented_at: self.documented_at,
    })
  }
}

const SELECT_COLUMNS: &str = "filepath, filename, dataset, overview, ddd_context, functions, exports, imports, \
  types_interfaces_classes, constants, dependencies, other_notes, full_content, content_hash, documented_at_commit, documented_at";

/// Exact-match lookup (spec.md C4: "Exact-match on `filepath` (no LIKE)").
pub fn get_file_documentation(conn: &Connection, filepath: &str, dataset: &str, include_content: bool) -> DbResult<Option<FileDoc>> {
  let sql = format!("SELECT {SELECT_COLUMNS} FROM files WHERE dataset = ?1 AND filepath = ?2");
  let raw = conn
    .query_row(&sql, params![dataset, filepath], row_to_filedoc)
    .optional()
    .map_err(DbError::Sqlite)?;
  let Some(raw) = raw else { return Ok(None) };
  let mut doc = raw.into_filedoc()?;
  if !include_content {
    doc.full_content = None;
  }
  Ok(Some(doc))
}

pub fn get_dataset_files(conn: &Connection, dataset: &str) -> DbResult<Vec<String>> {
  let mut stmt = conn.prepare("SELECT filepath FROM files WHERE dataset = ?1 ORDER BY filepath")?;
  let rows = stmt.query_map(params![dataset], |r| r.get::<_, String>(0))?;
  rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::Sqlite)
}

/// UPSERT on `(dataset, filepath)` (spec.md C4 `insert_documentation`).
pub fn insert_documentation(conn: &Connection, doc: &FileDoc) -> DbResult<bool> {
  conn.execute(
    r#"
    INSERT INTO files (
      filepath, filename, dataset, overview, ddd_context, functions, exports, imports,
      types_interfaces_classes, constants, dependencies, other_notes, full_content, content_hash,
      documented_at_commit, documented_at
    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
    ON CONFLICT(dataset, filepath) DO UPDATE SET
      filename = excluded.filename,
      overview = excluded.overview,
      ddd_context = excluded.ddd_context,
      functions = excluded.functions,
      exports = excluded.exports,
      imports = excluded.imports,
      types_interfaces_classes = excluded.types_interfaces_classes,
      constants = excluded.constants,
      dependencies = excluded.dependencies,
      other_notes = excluded.other_notes,
      full_content = excluded.full_content,
      content_hash = excluded.content_hash,
      documented_at_commit = excluded.documented_at_commit,
      documented_at = excluded.documented_at
    "#,
    params![
      doc.filepath,
      doc.filename,
      doc.dataset,
      doc.overview,
      doc.ddd_context,
      blob_to_json(&doc.functions),
      blob_to_json(&doc.exports),
      blob_to_json(&doc.imports),
      blob_to_json(&doc.types_interfaces_classes),
      blob_to_json(&doc.constants),
      serde_json::to_string(&doc.dependencies).unwrap_or_default(),
      serde_json::to_string(&doc.other_notes).unwrap_or_default(),
      doc.full_content,
      doc.content_hash,
      doc.documented_at_commit,
      doc.documented_at,
    ],
  )?;
  Ok(true)
}

#[derive(Debug, Default)]
pub struct BatchResult {
  pub total: usize,
  pub successful: usize,
  pub failed: usize,
  pub errors: Vec<String>,
}

/// One transaction for the whole batch: either all rows land or none
/// (spec.md C4 `insert_documentation_batch`). Chunked internally if the
/// batch is very large to stay under sqlite's bound-variable limit.
pub fn insert_documentation_batch(conn: &mut Connection, docs: &[FileDoc]) -> DbResult<BatchResult> {
  const CHUNK_SIZE: usize = 200;
  let mut result = BatchResult {
    total: docs.len(),
    ..Default::default()
  };

  let tx = conn.transaction().map_err(DbError::Sqlite)?;
  for chunk in docs.chunks(CHUNK_SIZE) {
    for doc in chunk {
      match insert_documentation(&tx, doc) {
        Ok(_) => result.successful += 1,
        Err(e) => {
          result.failed += 1;
          result.errors.push(format!("{}: {e}", doc.filepath));
        }
      }
    }
  }

  if result.failed > 0 {
    // all-or-nothing: any failure aborts the whole batch.
    drop(tx);
    return Err(DbError::Storage(format!("{} of {} rows failed, batch rolled back", result.failed, result.total)));
  }

  tx.commit().map_err(DbError::Sqlite)?;
  Ok(result)
}

/// Partial update; `updates` keys are whitelisted against
/// `UPDATABLE_FILEDOC_FIELDS` (spec.md P6: unknown keys are rejected,
/// preventing mass assignment).
pub fn update_documentation(conn: &Connection, filepath: &str, dataset: &str, updates: &serde_json::Map<String, Value>) -> DbResult<bool> {
  for key in updates.keys() {
    if !UPDATABLE_FILEDOC_FIELDS.contains(&key.as_str()) {
      return Err(DbError::Validation(format!("`{key}` is not an updatable field")));
    }
  }
  if updates.is_empty() {
    return Ok(false);
  }

  let mut set_clauses = Vec::new();
  let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
  for (key, value) in updates {
    set_clauses.push(format!("{key} = ?"));
    values.push(json_value_to_sql(key, value)?);
  }
  set_clauses.push("documented_at = ?".to_string());
  values.push(Box::new(Utc::now()));

  let sql = format!("UPDATE files SET {} WHERE dataset = ? AND filepath = ?", set_clauses.join(", "));
  values.push(Box::new(dataset.to_string()));
  values.push(Box::new(filepath.to_string()));

  let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
  let affected = conn.execute(&sql, param_refs.as_slice())?;
  Ok(affected > 0)
}

fn json_value_to_sql(field: &str, value: &Value) -> DbResult<Box<dyn rusqlite::ToSql>> {
  let is_structured_blob = matches!(
    field,
    "functions" | "exports" | "imports" | "types_interfaces_classes" | "constants" | "dependencies" | "other_notes"
  );
  if is_structured_blob {
    return Ok(Box::new(serde_json::to_string(value).unwrap_or_default()));
  }
  match value {
    Value::String(s) => Ok(Box::new(s.clone())),
    Value::Null => Ok(Box::new(Option::<String>::None)),
    other => Ok(Box::new(other.to_string())),
  }
}

pub fn delete_documentation(conn: &Connection, filepath: &str, dataset: &str) -> DbResult<bool> {
  let affected = conn.execute("DELETE FROM files WHERE dataset = ?1 AND filepath = ?2", params![dataset, filepath])?;
  Ok(affected > 0)
}

pub fn delete_all_documentation(conn: &Connection, dataset: &str) -> DbResult<usize> {
  let affected = conn.execute("DELETE FROM files WHERE dataset = ?1", params![dataset])?;
  Ok(affected)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema;
  use chrono::Utc;

  fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    schema::create_all(&conn).unwrap();
    conn
      .execute(
        "INSERT INTO dataset_metadata(dataset_id, source_dir, loaded_at, updated_at, dataset_type) VALUES ('core', '/tmp', '2024', '2024', 'main')",
        [],
      )
      .unwrap();
    conn
  }

  fn sample_doc(filepath: &str) -> FileDoc {
    FileDoc {
      filepath: filepath.to_string(),
      filename: filepath.to_string(),
      dataset: "core".to_string(),
      overview: "overview text".to_string(),
      ddd_context: None,
      functions: None,
      exports: None,
      imports: None,
      types_interfaces_classes: None,
      constants: None,
      dependencies: vec![],
      other_notes: vec![],
      full_content: Some("fn validate_token() {}".to_string()),
      content_hash: "hash1".to_string(),
      documented_at_commit: None,
      documented_at: Utc::now(),
    }
  }

  #[test]
  fn insert_then_get_round_trips() {
    let conn = setup();
    let doc = sample_doc("src/auth/login.py");
    insert_documentation(&conn, &doc).unwrap();

    let fetched = get_file_documentation(&conn, "src/auth/login.py", "core", true).unwrap().unwrap();
    assert_eq!(fetched.filepath, doc.filepath);
    assert_eq!(fetched.content_hash, doc.content_hash);
    assert_eq!(fetched.full_content, doc.full_content);
  }

  #[test]
  fn get_without_content_strips_full_content() {
    let conn = setup();
    let doc = sample_doc("a.rs");
    insert_documentation(&conn, &doc).unwrap();
    let fetched = get_file_documentation(&conn, "a.rs", "core", false).unwrap().unwrap();
    assert!(fetched.full_content.is_none());
  }

  #[test]
  fn upsert_overwrites_existing_row() {
    let conn = setup();
    let mut doc = sample_doc("a.rs");
    insert_documentation(&conn, &doc).unwrap();
    doc.overview = "changed".to_string();
    insert_documentation(&conn, &doc).unwrap();

    let count: i64 = conn.query_row("SELECT count(*) FROM files", [], |r| r.get(0)).unwrap();
    assert_eq!(count, 1);
    let fetched = get_file_documentation(&conn, "a.rs", "core", false).unwrap().unwrap();
    assert_eq!(fetched.overview, "changed");
  }

  #[test]
  fn update_rejects_unknown_key() {
    let conn = setup();
    insert_documentation(&conn, &sample_doc("a.rs")).unwrap();
    let mut updates = serde_json::Map::new();
    updates.insert("dataset".to_string(), Value::String("other".to_string()));
    let err = update_documentation(&conn, "a.rs", "core", &updates).unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
  }

  #[test]
  fn update_whitelisted_key_mutates_state() {
    let conn = setup();
    insert_documentation(&conn, &sample_doc("a.rs")).unwrap();
    let mut updates = serde_json::Map::new();
    updates.insert("overview".to_string(), Value::String("new overview".to_string()));
    assert!(update_documentation(&conn, "a.rs", "core", &updates).unwrap());
    let fetched = get_file_documentation(&conn, "a.rs", "core", false).unwrap().unwrap();
    assert_eq!(fetched.overview, "new overview");
  }

  #[test]
  fn delete_removes_row() {
    let conn = setup();
    insert_documentation(&conn, &sample_doc("a.rs")).unwrap();
    assert!(delete_documentation(&conn, "a.rs", "core").unwrap());
    assert!(get_file_documentation(&conn, "a.rs", "core", false).unwrap().is_none());
  }

  #[test]
  fn batch_insert_is_all_or_nothing() {
    let mut conn = setup();
    let docs = vec![sample_doc("a.rs"), sample_doc("b.rs")];
    let result = insert_documentation_batch(&mut conn, &docs).unwrap();
    assert_eq!(result.successful, 2);
    let count: i64 = conn.query_row("SELECT count(*) FROM files", [], |r| r.get(0)).unwrap();
    assert_eq!(count, 2);
  }

  #[test]
  fn get_dataset_files_is_sorted() {
    let conn = setup();
    insert_documentation(&conn, &sample_doc("b.rs")).unwrap();
    insert_documentation(&conn, &sample_doc("a.rs")).unwrap();
    assert_eq!(get_dataset_files(&conn, "core").unwrap(), vec!["a.rs".to_string(), "b.rs".to_string()]);
  }
}
