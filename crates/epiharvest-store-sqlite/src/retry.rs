//! Bounded retry with a fixed delay for transient database failures.

use std::time::Duration;

use rusqlite::ErrorCode;

/// How many times an operation is attempted, and how long to wait between
/// attempts. Every attempt after the first runs on a fresh connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub delay:    Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { attempts: 3, delay: Duration::from_secs(5) } }
}

impl RetryPolicy {
  /// No delay between attempts — useful for testing.
  pub fn immediate(attempts: u32) -> Self { Self { attempts, delay: Duration::ZERO } }

  pub(crate) fn max_attempts(&self) -> u32 { self.attempts.max(1) }
}

/// Connection and operational failures that a reconnect may cure.
pub fn is_transient(err: &tokio_rusqlite::Error) -> bool {
  match err {
    tokio_rusqlite::Error::ConnectionClosed => true,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
      e.code,
      ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::CannotOpen
        | ErrorCode::SystemIoFailure
    ),
    _ => false,
  }
}
