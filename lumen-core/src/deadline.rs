//! Bounded collaborator calls

use crate::{LumenError, LumenResult};
use std::future::Future;
use std::time::Duration;

/// Await `future` for at most `limit`. On expiry the future is dropped and the
/// error produced by `on_timeout` is returned instead.
pub async fn with_deadline<T, F, E>(limit: Duration, future: F, on_timeout: E) -> LumenResult<T>
where
    F: Future<Output = LumenResult<T>>,
    E: FnOnce(u64) -> LumenError,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    fn storage_timeout(timeout_ms: u64) -> LumenError {
        LumenError::Storage(StorageError::Timeout {
            operation: "query".to_string(),
            timeout_ms,
        })
    }

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(7) }, storage_timeout).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_maps_error() {
        let result: LumenResult<()> = with_deadline(
            Duration::from_millis(50),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            storage_timeout,
        )
        .await;
        match result {
            Err(LumenError::Storage(StorageError::Timeout { timeout_ms, .. })) => {
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
