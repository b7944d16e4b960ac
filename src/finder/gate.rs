//! Flood wait handling around single remote calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::DirectoryError;
use crate::config::CooldownPolicy;

/// Wraps one remote call and applies the configured [`CooldownPolicy`]
/// when Telegram answers with a flood wait.
///
/// Non-cooldown errors are always returned untouched.
#[derive(Debug, Clone)]
pub struct RequestGate {
    policy: CooldownPolicy,
    max_wait: Duration,
}

impl RequestGate {
    /// Creates a gate with the given policy. Waits longer than `max_wait`
    /// are handed back to the caller even under
    /// [`CooldownPolicy::RetryOnce`].
    #[must_use]
    pub const fn new(policy: CooldownPolicy, max_wait: Duration) -> Self {
        Self { policy, max_wait }
    }

    /// Creates a gate that never sleeps.
    #[must_use]
    pub const fn abort_on_cooldown() -> Self {
        Self::new(CooldownPolicy::Abort, Duration::ZERO)
    }

    /// Runs `operation`, retrying it once after the requested wait if the
    /// policy allows it.
    ///
    /// If `cancel` fires during the wait the original cooldown is returned
    /// and the operation is not retried.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, DirectoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        let seconds = match operation().await {
            Err(DirectoryError::Cooldown(seconds)) => seconds,
            other => return other,
        };

        let wait = Duration::from_secs(u64::from(seconds));
        if self.policy == CooldownPolicy::Abort || wait > self.max_wait {
            warn!("{label}: flood wait of {seconds} seconds, not retrying");
            return Err(DirectoryError::Cooldown(seconds));
        }

        warn!("{label}: flood wait of {seconds} seconds, sleeping before one retry");
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("{label}: cancelled during flood wait");
                return Err(DirectoryError::Cooldown(seconds));
            }
            () = tokio::time::sleep(wait) => {}
        }
        debug!("{label}: retrying after flood wait");

        operation().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        let gate = RequestGate::abort_on_cooldown();
        let result = gate
            .execute("test", &CancellationToken::new(), || async {
                Ok::<_, DirectoryError>(5)
            })
            .await;
        assert_eq!(result, Ok(5));
    }

    #[tokio::test]
    async fn test_abort_policy_propagates_cooldown() {
        let gate = RequestGate::new(CooldownPolicy::Abort, Duration::from_secs(600));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = gate
            .execute("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DirectoryError::Cooldown(30)) }
            })
            .await;

        assert_eq!(result, Err(DirectoryError::Cooldown(30)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_once_sleeps_exactly_the_wait() {
        let gate = RequestGate::new(CooldownPolicy::RetryOnce, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = gate
            .execute("test", &CancellationToken::new(), || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(DirectoryError::Cooldown(7))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_once_gives_up_after_second_cooldown() {
        let gate = RequestGate::new(CooldownPolicy::RetryOnce, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = gate
            .execute("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DirectoryError::Cooldown(3)) }
            })
            .await;

        assert_eq!(result, Err(DirectoryError::Cooldown(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_above_cap_is_not_slept() {
        let gate = RequestGate::new(CooldownPolicy::RetryOnce, Duration::from_secs(10));
        let result: Result<(), _> = gate
            .execute("test", &CancellationToken::new(), || async {
                Err(DirectoryError::Cooldown(3600))
            })
            .await;
        assert_eq!(result, Err(DirectoryError::Cooldown(3600)));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let gate = RequestGate::new(CooldownPolicy::RetryOnce, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = gate
            .execute("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DirectoryError::Remote("CHAT_ADMIN_REQUIRED".to_owned())) }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::Remote(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_wait() {
        let gate = RequestGate::new(CooldownPolicy::RetryOnce, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = gate
            .execute("test", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DirectoryError::Cooldown(50)) }
            })
            .await;

        assert_eq!(result, Err(DirectoryError::Cooldown(50)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }
}
