use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::DbError;

/// Runs `f` against `conn`, interrupting the connection if it has not
/// returned within `timeout_ms` (spec.md §5: "Per-query timeout is
/// enforced by the backend via a database-level interrupt mechanism set
/// from a separate timer; the timer is always cancelled on exit from the
/// scoped region"). `timeout_ms == 0` disables the timer entirely.
///
/// If the interrupt fires before `f` completes, the underlying sqlite call
/// returns `rusqlite::Error::SqliteFailure` with
/// `ErrorCode::OperationInterrupted`, which is translated to
/// `DbError::QueryTimeout`.
pub fn with_query_timeout<T>(conn: &Connection, timeout_ms: u64, f: impl FnOnce() -> rusqlite::Result<T>) -> Result<T, DbError> {
  if timeout_ms == 0 {
    return f().map_err(DbError::Sqlite);
  }

  let handle = conn.get_interrupt_handle();
  let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

  let timer = thread::spawn(move || {
    if cancel_rx.recv_timeout(Duration::from_millis(timeout_ms)).is_err() {
      handle.interrupt();
    }
  });

  let result = f();
  let _ = cancel_tx.send(());
  let _ = timer.join();

  result.map_err(|e| {
    if is_interrupted(&e) {
      DbError::QueryTimeout(timeout_ms)
    } else {
      DbError::Sqlite(e)
    }
  })
}

fn is_interrupted(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(ffi_err, _)
      if ffi_err.code == rusqlite::ErrorCode::OperationInterrupted
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fast_query_succeeds_under_timeout() {
    let conn = Connection::open_in_memory().unwrap();
    let result = with_query_timeout(&conn, 1000, || conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)));
    assert_eq!(result.unwrap(), 1);
  }

  #[test]
  fn zero_timeout_disables_timer() {
    let conn = Connection::open_in_memory().unwrap();
    let result = with_query_timeout(&conn, 0, || conn.query_row("SELECT 2", [], |r| r.get::<_, i64>(0)));
    assert_eq!(result.unwrap(), 2);
  }
}
