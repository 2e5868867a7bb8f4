use cq_core::{MatchType, SearchHit};
use rusqlite::{params, Connection};

use crate::error::DbResult;
use crate::schema::FULL_CONTENT_FTS_COLUMN_INDEX;
use crate::timeout::with_query_timeout;

/// spec.md §9 open question #2: the metadata-vs-content scoring weight is
/// a heuristic, exposed as a named constant rather than re-derived per call.
pub const METADATA_SCORE_WEIGHT: f64 = 0.8;

const METADATA_COLUMNS: &[&str] = &[
  "filepath",
  "filename",
  "overview",
  "functions",
  "exports",
  "imports",
  "types_interfaces_classes",
  "constants",
  "dependencies",
  "other_notes",
  "ddd_context",
];

/// Restrict an already-built FTS query to a subset of `files_fts`'s
/// columns, using FTS5's column-filter syntax: `{col1 col2 ...}: query`.
fn scoped(query: &str, columns: &[&str]) -> String {
  format!("{{{}}} : {}", columns.join(" "), query)
}

fn snippet_expr() -> String {
  format!("snippet(files_fts, {FULL_CONTENT_FTS_COLUMN_INDEX}, '\u{2023}', '\u{2023}', '…', 32)")
}

/// FTS string → ranked hits over metadata columns only (spec.md C4
/// `search_metadata`). `snippet` is always `None` per spec.md §4.5 ("for
/// metadata-only hits, snippet=null and match_type='metadata'").
pub fn search_metadata(conn: &Connection, fts_query: &str, dataset: &str, limit: u32, timeout_ms: u64) -> DbResult<Vec<SearchHit>> {
  let scoped_query = scoped(fts_query, METADATA_COLUMNS);
  with_query_timeout(conn, timeout_ms, || {
    let sql = "SELECT f.filepath, f.filename, f.dataset, f.overview, f.ddd_context, -bm25(files_fts) AS score \
       FROM files_fts JOIN files f ON f.rowid = files_fts.rowid \
       WHERE files_fts MATCH ?1 AND f.dataset = ?2 ORDER BY score DESC LIMIT ?3";
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![scoped_query, dataset, limit], |row| {
      Ok(SearchHit {
        filepath: row.get(0)?,
        filename: row.get(1)?,
        dataset: row.get(2)?,
        overview: row.get(3)?,
        ddd_context: row.get(4)?,
        score: row.get(5)?,
        snippet: None,
        match_type: MatchType::Metadata,
      })
    })?;
    rows.collect()
  })
}

/// FTS string → ranked hits over `full_content` only (spec.md C4
/// `search_content`).
pub fn search_content(conn: &Connection, fts_query: &str, dataset: &str, limit: u32, include_snippets: bool, timeout_ms: u64) -> DbResult<Vec<SearchHit>> {
  let scoped_query = scoped(fts_query, &["full_content"]);
  let snippet_col = if include_snippets { snippet_expr() } else { "NULL".to_string() };
  with_query_timeout(conn, timeout_ms, || {
    let sql = format!(
      "SELECT f.filepath, f.filename, f.dataset, f.overview, f.ddd_context, -bm25(files_fts) AS score, {snippet_col} AS snip \
       FROM files_fts JOIN files f ON f.rowid = files_fts.rowid \
       WHERE files_fts MATCH ?1 AND f.dataset = ?2 ORDER BY score DESC LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![scoped_query, dataset, limit], |row| {
      Ok(SearchHit {
        filepath: row.get(0)?,
        filename: row.get(1)?,
        dataset: row.get(2)?,
        overview: row.get(3)?,
        ddd_context: row.get(4)?,
        score: row.get(5)?,
        snippet: row.get(6)?,
        match_type: MatchType::Content,
      })
    })?;
    rows.collect()
  })
}

/// Combines a content-scoped and metadata-scoped match, deduplicating by
/// `filepath` via a window function that keeps the max-scoring row per
/// path (spec.md C4 `search_unified`: "DB-side dedup via window function
/// partitioned by filepath, keep max score"). A file that matches via both
/// channels is reported as `match_type = unified`.
pub fn search_unified(conn: &Connection, content_q: &str, metadata_q: &str, dataset: &str, limit: u32, timeout_ms: u64) -> DbResult<Vec<SearchHit>> {
  let content_query = scoped(content_q, &["full_content"]);
  let metadata_query = scoped(metadata_q, METADATA_COLUMNS);
  let snippet_col = snippet_expr();

  with_query_timeout(conn, timeout_ms, || {
    let sql = format!(
      r#"
      WITH combined AS (
        SELECT f.filepath, f.filename, f.dataset, f.overview, f.ddd_context,
               'content' AS mt, -bm25(files_fts) AS score, {snippet_col} AS snip
        FROM files_fts JOIN files f ON f.rowid = files_fts.rowid
        WHERE files_fts MATCH ?1 AND f.dataset = ?3
        UNION ALL
        SELECT f.filepath, f.filename, f.dataset, f.overview, f.ddd_context,
               'metadata' AS mt, -bm25(files_fts) * {METADATA_SCORE_WEIGHT} AS score, NULL AS snip
        FROM files_fts JOIN files f ON f.rowid = files_fts.rowid
        WHERE files_fts MATCH ?2 AND f.dataset = ?3
      ),
      ranked AS (
        SELECT *,
               ROW_NUMBER() OVER (PARTITION BY filepath ORDER BY score DESC) AS rn,
               COUNT(*) OVER (PARTITION BY filepath) AS cnt
        FROM combined
      )
      SELECT filepath, filename, dataset, overview, ddd_context,
             CASE WHEN cnt > 1 THEN 'unified' ELSE mt END AS match_type, score, snip
      FROM ranked WHERE rn = 1
      ORDER BY score DESC
      LIMIT ?4
      "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![content_query, metadata_query, dataset, limit], |row| {
      let mt: String = row.get(5)?;
      let match_type = match mt.as_str() {
        "content" => MatchType::Content,
        "unified" => MatchType::Unified,
        _ => MatchType::Metadata,
      };
      Ok(SearchHit {
        filepath: row.get(0)?,
        filename: row.get(1)?,
        dataset: row.get(2)?,
        overview: row.get(3)?,
        ddd_context: row.get(4)?,
        score: row.get(6)?,
        snippet: row.get(7)?,
        match_type,
      })
    })?;
    rows.collect()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::files::insert_documentation;
  use crate::schema;
  use chrono::Utc;
  use cq_core::FileDoc;

  fn setup_with_file(filepath: &str, overview: &str, full_content: &str) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    schema::create_all(&conn).unwrap();
    conn
      .execute(
        "INSERT INTO dataset_metadata(dataset_id, source_dir, loaded_at, updated_at, dataset_type) VALUES ('core', '/tmp', '2024', '2024', 'main')",
        [],
      )
      .unwrap();
    insert_documentation(
      &conn,
      &FileDoc {
        filepath: filepath.to_string(),
        filename: filepath.to_string(),
        dataset: "core".to_string(),
        overview: overview.to_string(),
        ddd_context: None,
        functions: None,
        exports: None,
        imports: None,
        types_interfaces_classes: None,
        constants: None,
        dependencies: vec![],
        other_notes: vec![],
        full_content: Some(full_content.to_string()),
        content_hash: "h".to_string(),
        documented_at_commit: None,
        documented_at: Utc::now(),
      },
    )
    .unwrap();
    conn
  }

  #[test]
  fn search_content_finds_function_name() {
    let conn = setup_with_file("src/auth/login.py", "login overview", "def validate_token(): pass");
    let hits = search_content(&conn, "validate_token", "core", 10, true, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].match_type, MatchType::Content);
    assert!(hits[0].score > 0.0);
  }

  #[test]
  fn search_metadata_ignores_full_content() {
    let conn = setup_with_file("a.rs", "auth overview", "fn secret_impl() {}");
    let hits = search_metadata(&conn, "secret_impl", "core", 10, 0).unwrap();
    assert!(hits.is_empty());
    let hits = search_metadata(&conn, "auth", "core", 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].snippet.is_none());
  }

  #[test]
  fn dollar_prefixed_token_matches_exactly() {
    let conn = setup_with_file("a.js", "http client", "const HTTP_CLIENT = new $httpClient()");
    let hits = search_content(&conn, "$httpClient", "core", 10, false, 0).unwrap();
    assert_eq!(hits.len(), 1);

    let hits_bare = search_content(&conn, "httpClient", "core", 10, false, 0).unwrap();
    assert!(hits_bare.is_empty());
  }

  #[test]
  fn unified_dedups_and_marks_unified_match_type() {
    let conn = setup_with_file("a.rs", "auth module", "fn auth_check() {}");
    let hits = search_unified(&conn, "auth", "auth", "core", 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].match_type, MatchType::Unified);
  }

  #[test]
  fn unified_keeps_content_only_match_type_when_metadata_silent() {
    let conn = setup_with_file("a.rs", "unrelated overview", "fn totally_unique_token() {}");
    let hits = search_unified(&conn, "totally_unique_token", "nonmatching_metadata_term", "core", 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].match_type, MatchType::Content);
  }
}
