//! Explicit timeouts for collaborator calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default bound applied to embedding, search and chat calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Await `fut`, failing with [`Error::Timeout`] once `timeout` elapses.
pub async fn bounded<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "call timed out");
            Err(Error::Timeout {
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let value = bounded("noop", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let err = bounded("slow search", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        match err {
            Error::Timeout { operation, timeout_ms } => {
                assert_eq!(operation, "slow search");
                assert_eq!(timeout_ms, 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
