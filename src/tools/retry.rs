//! Bounded retry with exponential backoff for repair actions

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collaborators::DependencyError;
use crate::config::{defaults, RetrySettings};

/// `delay(attempt) = min(base * 2^(attempt - 1), cap)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `attempts` is clamped to the supported range.
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.clamp(defaults::MIN_RETRY_ATTEMPTS, defaults::MAX_RETRY_ATTEMPTS),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_settings(attempts: u32, settings: &RetrySettings) -> Self {
        Self::new(
            attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay honouring a server-requested wait, still bounded by the cap and
    /// never shorter than `previous`.
    fn delay_after(&self, attempt: u32, error: &DependencyError, previous: Duration) -> Duration {
        let backoff = self.delay_for(attempt);
        let computed = match error.retry_after() {
            Some(requested) => backoff.max(requested),
            None => backoff,
        };
        computed.max(previous).min(self.max_delay)
    }
}

/// Result of a retried operation plus what the loop did.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, DependencyError>,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

impl<T> RetryOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. Every attempt is appended to `actions`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    actions: &mut Vec<String>,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DependencyError>>,
{
    let mut delays = Vec::new();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                actions.push(format!("{label}: succeeded on attempt {attempt}/{}", policy.attempts));
                debug!(action = label, attempt, "Repair step succeeded");
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    delays,
                };
            }
            Err(e) => {
                actions.push(format!(
                    "{label}: attempt {attempt}/{} failed: {e}",
                    policy.attempts
                ));
                if !e.is_retryable() {
                    actions.push(format!("{label}: not retryable, giving up"));
                    warn!(action = label, attempt, error = %e, "Repair step failed permanently");
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                        delays,
                    };
                }
                if attempt >= policy.attempts {
                    warn!(action = label, attempts = attempt, error = %e, "Repair step exhausted retries");
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                        delays,
                    };
                }
                let previous = delays.last().copied().unwrap_or_default();
                let delay = policy.delay_after(attempt, &e, previous);
                debug!(action = label, attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                delays.push(delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
