use std::error::Error;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::storage::StorageError;

/// Errors that know whether a retry can help.
pub trait RetryableError: Error + Send + Sync {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for StorageError {
    fn is_retryable(&self) -> bool {
        StorageError::is_retryable(self)
    }
}

/// Static retry function for retrying operations
///
/// Non-retryable errors are returned immediately. Retryable ones are retried
/// up to `max_retries` times with exponential backoff starting at 100ms.
pub async fn retry_with_max_retries<F, Fut, T, E>(
    max_retries: usize,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                warn!(
                    "Retryable error in {} (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    max_retries,
                    e
                );

                // 100ms, 200ms, 400ms, ... capped at 2^10
                let backoff_ms = 100 * (1u64 << attempt.min(10));
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}
