//! Cancellable poll-until primitive
//!
//! Instance health, SSH readiness and long-running cloud operations all wait
//! through [`poll_until`].

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Interval, deadline and cancellation for one wait
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Instance status checks
    pub fn instance_status(cancel: CancellationToken) -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(15 * 60)).with_cancel(cancel)
    }

    /// SSH reachability
    pub fn ssh_ready(cancel: CancellationToken) -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(10 * 60)).with_cancel(cancel)
    }

    /// Cloud long-running operations
    pub fn operation(cancel: CancellationToken) -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10 * 60)).with_cancel(cancel)
    }
}

/// Call `check` every `interval` until it yields `Some`.
///
/// A `check` error aborts the wait. Cancellation is honored before the first
/// attempt, during each attempt and while sleeping.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, what: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut attempt = 0u32;

    loop {
        if config.cancel.is_cancelled() {
            return Err(CloudError::Cancelled(what.to_string()));
        }

        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = config.cancel.cancelled() => return Err(CloudError::Cancelled(what.to_string())),
            outcome = check() => outcome?,
        };
        if let Some(value) = outcome {
            tracing::debug!("{} ready after {} attempt(s)", what, attempt);
            return Ok(value);
        }

        if Instant::now() + config.interval > deadline {
            return Err(CloudError::Timeout(format!(
                "{} not ready after {:?}",
                what, config.timeout
            )));
        }
        tracing::debug!("Waiting for {} (attempt {})", what, attempt);

        tokio::select! {
            biased;
            _ = config.cancel.cancelled() => return Err(CloudError::Cancelled(what.to_string())),
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> PollConfig {
        PollConfig::new(Duration::from_millis(10), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_poll_until_ready() {
        let calls = &AtomicU32::new(0);
        let value = poll_until(&fast(), "counter", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((n >= 3).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_poll_until_propagates_error() {
        let result: Result<()> = poll_until(&fast(), "broken", || async {
            Err(CloudError::api("DescribeInstanceStatus", "throttled"))
        })
        .await;

        assert!(matches!(result, Err(CloudError::Api { .. })));
    }

    #[tokio::test]
    async fn test_poll_until_already_cancelled() {
        let config = fast();
        config.cancel.cancel();

        let calls = &AtomicU32::new(0);
        let result: Result<()> = poll_until(&config, "never", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .await;

        assert!(matches!(result, Err(CloudError::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_timeout() {
        let config = PollConfig::new(Duration::from_secs(5), Duration::from_secs(30));
        let result: Result<()> = poll_until(&config, "stuck", || async { Ok(None) }).await;

        assert!(matches!(result, Err(CloudError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_poll_until_cancelled_while_sleeping() {
        let config = PollConfig::new(Duration::from_secs(3600), Duration::from_secs(7200));
        let cancel = config.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result: Result<()> = tokio::time::timeout(
            Duration::from_secs(1),
            poll_until(&config, "sleepy", || async { Ok(None) }),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(CloudError::Cancelled(_))));
    }
}
