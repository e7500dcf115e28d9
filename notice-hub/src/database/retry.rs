//! Retry helpers for SQLite writes.
//!
//! Several workers may write to the ledger and preference tables at once;
//! SQLite answers with `SQLITE_BUSY` / `SQLITE_LOCKED` when the write lock is
//! held longer than the busy timeout. Those writes are retried with capped
//! exponential backoff.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use rand::random;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

const BUSY_MAX_RETRIES: u32 = 8;
const BUSY_BASE_DELAY_MS: u64 = 10;
const BUSY_MAX_DELAY_MS: u64 = 1000;

fn is_busy_error(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    let sqlx::Error::Database(db_err) = sqlx_err else {
        return false;
    };

    // 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED
    let code = db_err.code().map(Cow::into_owned);
    if matches!(code.as_deref(), Some("5") | Some("6")) {
        return true;
    }

    let msg = db_err.message().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

/// Backoff for the given zero-based attempt, before jitter.
fn backoff_delay_ms(attempt: u32) -> u64 {
    BUSY_BASE_DELAY_MS
        .saturating_mul(1u64 << attempt.min(20))
        .min(BUSY_MAX_DELAY_MS)
}

/// Run `op`, retrying while it fails with a busy/locked database error.
///
/// Any other error (including duplicate-key violations) is returned at once.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_busy_error(&err) && attempt < BUSY_MAX_RETRIES => {
                let capped_ms = backoff_delay_ms(attempt);
                let jitter_ms = random::<u64>() % (capped_ms / 4 + 1);
                let delay = Duration::from_millis((capped_ms + jitter_ms).min(BUSY_MAX_DELAY_MS));

                debug!(
                    op = op_name,
                    attempt = attempt + 1,
                    max = BUSY_MAX_RETRIES,
                    "SQLite busy, retrying in {:?}",
                    delay
                );

                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay_ms(0), 10);
        assert_eq!(backoff_delay_ms(1), 20);
        assert_eq!(backoff_delay_ms(3), 80);
        assert_eq!(backoff_delay_ms(12), BUSY_MAX_DELAY_MS);
    }

    #[test]
    fn test_non_database_errors_are_not_busy() {
        assert!(!is_busy_error(&Error::validation("x")));
        assert!(!is_busy_error(&Error::DatabaseSqlx(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn test_non_busy_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_sqlite_busy("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::duplicate("NoticeSetting", "k")) }
        })
        .await;

        assert!(result.unwrap_err().is_duplicate());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
