use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before the `retry`-th retry (1-indexed): `base * 2^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Run `op`, retrying transient failures. The last error is returned
    /// unchanged once retries are exhausted; non-transient errors return
    /// immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt > self.max_retries {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn status(code: u16) -> RemoteError {
        RemoteError::Status {
            status: code,
            body: format!("body-{}", code),
        }
    }

    #[test]
    fn delays_double_per_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(800));
        assert_eq!(policy.delay_for(1), Duration::from_millis(800));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1600));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3200));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_429_twice_then_succeeds() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let start = Instant::now();
        let calls: Arc<Mutex<Vec<Duration>>> = Arc::default();

        let seen = calls.clone();
        let result = policy
            .run("test", || {
                let seen = seen.clone();
                async move {
                    let mut guard = seen.lock().unwrap();
                    guard.push(start.elapsed());
                    if guard.len() <= 2 {
                        Err(status(429))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        // Gaps between attempts are exactly base and 2*base.
        assert_eq!(calls[1] - calls[0], Duration::from_millis(100));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_not_retried() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let count = Arc::new(Mutex::new(0u32));
        let c = count.clone();
        let start = Instant::now();
        let result: Result<(), _> = policy
            .run("test", || {
                let c = c.clone();
                async move {
                    *c.lock().unwrap() += 1;
                    Err(status(400))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error_unchanged() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let count = Arc::new(Mutex::new(0u32));
        let c = count.clone();
        let result: Result<(), _> = policy
            .run("test", || {
                let c = c.clone();
                async move {
                    let mut n = c.lock().unwrap();
                    *n += 1;
                    Err(status(500 + *n as u16))
                }
            })
            .await;

        assert_eq!(*count.lock().unwrap(), 3);
        match result.unwrap_err() {
            RemoteError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "body-503");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_retried() {
        let policy = RetryPolicy::new(1, Duration::from_millis(10));
        let count = Arc::new(Mutex::new(0u32));
        let c = count.clone();
        let result = policy
            .run("test", || {
                let c = c.clone();
                async move {
                    let mut n = c.lock().unwrap();
                    *n += 1;
                    if *n == 1 {
                        Err(RemoteError::Timeout)
                    } else {
                        Ok(*n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }
}
