use std::time::Duration;

use storesync_core::{
    config::SyncConfig,
    error::{Backend, SyncError},
};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retry schedule for backend calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            attempts: config.call_retries + 1,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }

    /// Delay after the given 1-based attempt, doubling per attempt and capped
    /// at [`MAX_RETRY_DELAY`].
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        (self.base_delay * factor).min(MAX_RETRY_DELAY)
    }
}

/// Runs `call` until it succeeds, fails non-transiently, or exhausts the
/// policy. A timed-out attempt counts as transient. A transient failure that
/// survives every attempt escalates to [`SyncError::RetriesExhausted`];
/// authentication failures are never retried.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    backend: Backend,
    what: &str,
    mut call: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Transient {
                backend,
                message: format!("{what} timed out after {:?}", policy.call_timeout),
            }),
        };
        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{what} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    "{what} failed (attempt {attempt}/{}), retrying in {delay:?}: {e}",
                    policy.attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.exhausted(attempt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_secs(1),
        }
    }

    fn transient() -> SyncError {
        SyncError::Transient { backend: Backend::JobQueue, message: "503".to_string() }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&policy(), Backend::JobQueue, "list jobs", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 { Err(transient()) } else { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_escalates() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&policy(), Backend::JobQueue, "list jobs", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(transient())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(SyncError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&policy(), Backend::Tracker, "read issue", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(SyncError::Auth {
                backend: Backend::Tracker,
                message: "401".to_string(),
            })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(SyncError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);
        let result = with_retries(&policy, Backend::JobQueue, "request sync", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(1)
        })
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            attempts: 10,
            base_delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(2));
        assert_eq!(policy.delay(60), MAX_RETRY_DELAY);
    }
}
