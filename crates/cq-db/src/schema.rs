use rusqlite::Connection;

use crate::error::DbResult;

/// Token characters the FTS5 tokenizer must treat as part of a token
/// rather than as a separator (spec.md §6, bit-exact tokenizer
/// requirement): unicode identifier characters plus `. _ $ @ - > : #`.
///
/// Note this crate uses FTS5's `tokenchars` option, not `separators` —
/// `tokenchars` *adds* characters to the token-character set, which is
/// what the bit-exact requirement calls for. (A reference codebase in the
/// same domain used `separators` for this, which instead treats the listed
/// characters as split points — the opposite of what's needed here.)
pub const TOKEN_CHARS: &str = "._$@->:#";

/// Ordinal position (0-based) of `full_content` in the `files_fts` column
/// list below. `snippet()`/`highlight()` calls must target this index;
/// `assert_full_content_column_index` fails fast if the DDL and this
/// constant ever drift apart (spec.md §9 open question: "do not hardcode
/// index 2").
pub const FULL_CONTENT_FTS_COLUMN_INDEX: usize = 3;

pub const FILES_FTS_COLUMNS: &[&str] = &[
  "filepath",
  "filename",
  "overview",
  "full_content",
  "functions",
  "exports",
  "imports",
  "types_interfaces_classes",
  "constants",
  "dependencies",
  "other_notes",
  "ddd_context",
];

pub fn assert_full_content_column_index() {
  assert_eq!(
    FILES_FTS_COLUMNS[FULL_CONTENT_FTS_COLUMN_INDEX],
    "full_content",
    "files_fts column order drifted from FULL_CONTENT_FTS_COLUMN_INDEX"
  );
}

pub fn create_schema_version_table(conn: &Connection) -> DbResult<()> {
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS schema_version (
      version INTEGER NOT NULL
    );
    "#,
  )?;
  Ok(())
}

pub fn create_dataset_metadata_table(conn: &Connection) -> DbResult<()> {
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS dataset_metadata (
      dataset_id TEXT PRIMARY KEY,
      source_dir TEXT NOT NULL,
      files_count INTEGER NOT NULL DEFAULT 0,
      loaded_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      dataset_type TEXT NOT NULL CHECK(dataset_type IN ('main', 'fork', 'worktree', 'temporary')),
      parent_dataset_id TEXT REFERENCES dataset_metadata(dataset_id) ON DELETE SET NULL,
      source_branch TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_dataset_metadata_parent ON dataset_metadata(parent_dataset_id);
    CREATE INDEX IF NOT EXISTS idx_dataset_metadata_type ON dataset_metadata(dataset_type);
    "#,
  )?;
  Ok(())
}

pub fn create_files_table(conn: &Connection) -> DbResult<()> {
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS files (
      filepath TEXT NOT NULL,
      filename TEXT NOT NULL,
      dataset TEXT NOT NULL REFERENCES dataset_metadata(dataset_id) ON DELETE CASCADE,
      overview TEXT NOT NULL DEFAULT '',
      ddd_context TEXT,
      functions TEXT,
      exports TEXT,
      imports TEXT,
      types_interfaces_classes TEXT,
      constants TEXT,
      dependencies TEXT NOT NULL DEFAULT '[]',
      other_notes TEXT NOT NULL DEFAULT '[]',
      full_content TEXT,
      content_hash TEXT NOT NULL,
      documented_at_commit TEXT,
      documented_at TEXT NOT NULL,
      PRIMARY KEY (dataset, filepath)
    );
    CREATE INDEX IF NOT EXISTS idx_files_dataset ON files(dataset);
    CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);
    "#,
  )?;
  Ok(())
}

pub fn create_files_fts_table(conn: &Connection) -> DbResult<()> {
  assert_full_content_column_index();
  let sql = format!(
    r#"CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
        filepath,
        filename,
        overview,
        full_content,
        functions,
        exports,
        imports,
        types_interfaces_classes,
        constants,
        dependencies,
        other_notes,
        ddd_context,
        tokenize = "unicode61 tokenchars '{TOKEN_CHARS}'",
        content='files',
        content_rowid='rowid'
    )"#
  );
  conn.execute(&sql, [])?;
  Ok(())
}

pub fn create_files_fts_triggers(conn: &Connection) -> DbResult<()> {
  conn.execute_batch(
    r#"
    CREATE TRIGGER IF NOT EXISTS files_ai AFTER INSERT ON files BEGIN
      INSERT INTO files_fts(
        rowid, filepath, filename, overview, full_content, functions, exports,
        imports, types_interfaces_classes, constants, dependencies, other_notes, ddd_context
      ) VALUES (
        new.rowid, new.filepath, new.filename, new.overview, new.full_content, new.functions,
        new.exports, new.imports, new.types_interfaces_classes, new.constants, new.dependencies,
        new.other_notes, new.ddd_context
      );
    END;

    CREATE TRIGGER IF NOT EXISTS files_ad AFTER DELETE ON files BEGIN
      INSERT INTO files_fts(
        files_fts, rowid, filepath, filename, overview, full_content, functions, exports,
        imports, types_interfaces_classes, constants, dependencies, other_notes, ddd_context
      ) VALUES (
        'delete', old.rowid, old.filepath, old.filename, old.overview, old.full_content, old.functions,
        old.exports, old.imports, old.types_interfaces_classes, old.constants, old.dependencies,
        old.other_notes, old.ddd_context
      );
    END;

    CREATE TRIGGER IF NOT EXISTS files_au AFTER UPDATE ON files BEGIN
      INSERT INTO files_fts(
        files_fts, rowid, filepath, filename, overview, full_content, functions, exports,
        imports, types_interfaces_classes, constants, dependencies, other_notes, ddd_context
      ) VALUES (
        'delete', old.rowid, old.filepath, old.filename, old.overview, old.full_content, old.functions,
        old.exports, old.imports, old.types_interfaces_classes, old.constants, old.dependencies,
        old.other_notes, old.ddd_context
      );
      INSERT INTO files_fts(
        rowid, filepath, filename, overview, full_content, functions, exports,
        imports, types_interfaces_classes, constants, dependencies, other_notes, ddd_context
      ) VALUES (
        new.rowid, new.filepath, new.filename, new.overview, new.full_content, new.functions,
        new.exports, new.imports, new.types_interfaces_classes, new.constants, new.dependencies,
        new.other_notes, new.ddd_context
      );
    END;
    "#,
  )?;
  Ok(())
}

pub fn drop_files_fts_triggers(conn: &Connection) -> DbResult<()> {
  conn.execute_batch(
    r#"
    DROP TRIGGER IF EXISTS files_ai;
    DROP TRIGGER IF EXISTS files_ad;
    DROP TRIGGER IF EXISTS files_au;
    "#,
  )?;
  Ok(())
}

/// Full external-content rebuild, used after bulk loads done with the
/// sync triggers disabled, and by the tokenizer-upgrade migration.
pub fn rebuild_files_fts(conn: &Connection) -> DbResult<()> {
  conn.execute("INSERT INTO files_fts(files_fts) VALUES('delete-all')", [])?;
  conn.execute("INSERT INTO files_fts(files_fts) VALUES('rebuild')", [])?;
  Ok(())
}

/// Create every table, index and trigger needed by a fresh database.
/// Idempotent (all `IF NOT EXISTS`), safe to call on every open.
pub fn create_all(conn: &Connection) -> DbResult<()> {
  create_schema_version_table(conn)?;
  create_dataset_metadata_table(conn)?;
  create_files_table(conn)?;
  create_files_fts_table(conn)?;
  create_files_fts_triggers(conn)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_content_index_matches_declared_columns() {
    assert_full_content_column_index();
  }

  #[test]
  fn create_all_is_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    create_all(&conn).unwrap();
    create_all(&conn).unwrap();
  }

  #[test]
  fn fts_triggers_keep_row_counts_in_sync() {
    let conn = Connection::open_in_memory().unwrap();
    create_all(&conn).unwrap();
    conn
      .execute(
        "INSERT INTO dataset_metadata(dataset_id, source_dir, loaded_at, updated_at, dataset_type) VALUES ('core', '/tmp', '2024', '2024', 'main')",
        [],
      )
      .unwrap();
    conn
      .execute(
        "INSERT INTO files(filepath, filename, dataset, overview, content_hash, documented_at) VALUES ('a.rs', 'a.rs', 'core', 'x', 'h1', '2024')",
        [],
      )
      .unwrap();

    let files_count: i64 = conn.query_row("SELECT count(*) FROM files", [], |r| r.get(0)).unwrap();
    let fts_count: i64 = conn.query_row("SELECT count(*) FROM files_fts", [], |r| r.get(0)).unwrap();
    assert_eq!(files_count, fts_count);

    conn.execute("DELETE FROM files WHERE filepath = 'a.rs'", []).unwrap();
    let fts_count_after: i64 = conn.query_row("SELECT count(*) FROM files_fts", [], |r| r.get(0)).unwrap();
    assert_eq!(fts_count_after, 0);
  }
}
