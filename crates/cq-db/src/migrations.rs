use rusqlite::{Connection, Transaction};

use crate::error::{DbError, DbResult};
use crate::schema;

/// Current schema version a fresh database lands on.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub struct Migration {
  pub version: i64,
  pub name: &'static str,
  pub description: &'static str,
  apply: fn(&Transaction) -> DbResult<()>,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
  version: 1,
  name: "base_schema",
  description: "files, dataset_metadata, files_fts and sync triggers",
  apply: apply_base_schema,
}];

fn apply_base_schema(tx: &Transaction) -> DbResult<()> {
  schema::create_dataset_metadata_table(tx)?;
  schema::create_files_table(tx)?;
  schema::create_files_fts_table(tx)?;
  schema::create_files_fts_triggers(tx)?;
  Ok(())
}

/// A row of the `_migrations`-equivalent history, read back from
/// `schema_version` for diagnostics. Unlike the donor's LanceDB-backed
/// tracking table, this crate keeps a single current-version row — the
/// ordered `MIGRATIONS` list itself is the history.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
  pub version: i64,
  pub name: &'static str,
}

pub fn get_current_version(conn: &Connection) -> DbResult<i64> {
  schema::create_schema_version_table(conn)?;
  let version: Option<i64> = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0)).ok();
  Ok(version.unwrap_or(0))
}

pub fn pending_migrations(current: i64) -> Vec<&'static Migration> {
  MIGRATIONS.iter().filter(|m| m.version > current).collect()
}

pub fn needs_migration(conn: &Connection) -> DbResult<bool> {
  Ok(get_current_version(conn)? < CURRENT_SCHEMA_VERSION)
}

/// Run every migration with `version > current_version`, each inside its
/// own transaction (spec.md §4.4: "A migration is a (from_version,
/// to_version, apply) triple executed atomically"). Migration failure
/// halts startup — the caller propagates the error rather than continuing
/// with a partially-migrated database (spec.md §7: "Migration failure
/// halts startup with a non-zero exit").
pub fn run_migrations(conn: &mut Connection) -> DbResult<Vec<MigrationRecord>> {
  let current = get_current_version(conn)?;
  let mut applied = Vec::new();

  for migration in pending_migrations(current) {
    let tx = conn.transaction().map_err(DbError::Sqlite)?;
    (migration.apply)(&tx).map_err(|e| DbError::Migration(format!("migration {} ({}) failed: {e}", migration.version, migration.name)))?;
    tx.execute("DELETE FROM schema_version", [])
      .and_then(|_| tx.execute("INSERT INTO schema_version(version) VALUES (?1)", [migration.version]))
      .map_err(|e| DbError::Migration(format!("failed to record migration {}: {e}", migration.version)))?;
    tx.commit().map_err(DbError::Sqlite)?;
    applied.push(MigrationRecord {
      version: migration.version,
      name: migration.name,
    });
  }

  Ok(applied)
}

/// Safe-swap tokenizer upgrade (spec.md §4.4): build a replacement
/// `files_fts` virtual table under a temporary name with the new
/// `tokenchars` set, rebuild it from `files`, then drop the old table and
/// rename the new one into place. The original table remains queryable
/// until the rename; any failure before the rename leaves it untouched.
pub fn safe_swap_fts_tokenizer(conn: &mut Connection, new_token_chars: &str) -> DbResult<()> {
  let tx = conn.transaction().map_err(DbError::Sqlite)?;

  let create_tmp = format!(
    r#"CREATE VIRTUAL TABLE files_fts_new USING fts5(
        filepath, filename, overview, full_content, functions, exports, imports,
        types_interfaces_classes, constants, dependencies, other_notes, ddd_context,
        tokenize = "unicode61 tokenchars '{new_token_chars}'",
        content='files',
        content_rowid='rowid'
    )"#
  );

  let result: DbResult<()> = (|| {
    tx.execute(&create_tmp, [])?;
    tx.execute("INSERT INTO files_fts_new(files_fts_new) VALUES('rebuild')", [])?;
    tx.execute("DROP TABLE files_fts", [])?;
    tx.execute("ALTER TABLE files_fts_new RENAME TO files_fts", [])?;
    Ok(())
  })();

  match result {
    Ok(()) => {
      tx.commit().map_err(DbError::Sqlite)?;
      Ok(())
    }
    Err(e) => {
      // tx drops here and rolls back; the temporary table, if created,
      // is rolled back with it. Nothing further to free.
      Err(DbError::Migration(format!("tokenizer safe-swap failed, rolled back: {e}")))
    }
  }
}
