use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::{DbError, DbResult};

pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Connection pool sizing and timeouts (spec.md §4.4 "connection pooling").
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
  pub max_connections: u32,
  /// How long `get()` waits in the FIFO queue before giving up.
  pub connect_timeout: Duration,
  /// `PRAGMA busy_timeout`, set equal to the query timeout per spec.md §4.4.
  pub busy_timeout_ms: u64,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      max_connections: 8,
      connect_timeout: Duration::from_secs(5),
      busy_timeout_ms: 5_000,
    }
  }
}

/// A bounded pool of connections to one `code_data.db`. Every connection
/// enables `foreign_keys` and WAL mode and carries the configured busy
/// timeout, per spec.md §4.4: "Each connection enables foreign keys and
/// sets a busy timeout equal to the query timeout."
pub struct ConnectionPool {
  pool: Pool<SqliteConnectionManager>,
}

impl ConnectionPool {
  pub fn open(path: &Path, config: PoolConfig) -> DbResult<Self> {
    let busy_timeout_ms = config.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
      conn.pragma_update(None, "foreign_keys", "ON")?;
      conn.pragma_update(None, "journal_mode", "WAL")?;
      conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
      Ok(())
    });

    let pool = Pool::builder()
      .max_size(config.max_connections)
      .connection_timeout(config.connect_timeout)
      .build(manager)
      .map_err(|e| DbError::Pool(e.to_string()))?;

    Ok(Self { pool })
  }

  pub fn open_in_memory(config: PoolConfig) -> DbResult<Self> {
    let busy_timeout_ms = config.busy_timeout_ms;
    let manager = SqliteConnectionManager::memory().with_init(move |conn| {
      conn.pragma_update(None, "foreign_keys", "ON")?;
      conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
      Ok(())
    });
    // In-memory databases are per-connection; cap the pool at 1 so every
    // caller sees the same database.
    let pool = Pool::builder()
      .max_size(1)
      .connection_timeout(config.connect_timeout)
      .build(manager)
      .map_err(|e| DbError::Pool(e.to_string()))?;
    Ok(Self { pool })
  }

  /// Lease a connection, bounded by `PoolConfig::connect_timeout`
  /// (spec.md §5 "Acquiring a pooled database connection... returns a
  /// typed error on exhaustion").
  pub fn get(&self) -> DbResult<DbConnection> {
    self.pool.get().map_err(|e| DbError::PoolTimeout(e.to_string()))
  }
}
