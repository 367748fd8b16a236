//! # Retry Executor
//!
//! Exponential backoff with jitter around unary async operations. The
//! delay for attempt `k` is `min(base_delay * multiplier^k, max_delay)`
//! plus a uniform jitter, so a fleet of coordinators retrying against the
//! same sick backend does not thunder in lockstep.
//!
//! ```text
//! Attempt    Delay (base=500ms, x2, max=30s)
//! ─────────────────────────────────────────
//!    0          500ms + jitter
//!    1            1s  + jitter
//!    2            2s  + jitter
//!    3            4s  + jitter
//!   >max      last error surfaces
//! ```
//!
//! Only errors classified retryable by [`RetryClass`] loop; terminal
//! errors surface immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::RetryClass;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_JITTER: Duration = Duration::from_millis(100);

/// Backoff parameters for confirm/cancel delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential component.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform jitter added to every delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_MULTIPLIER,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// The default profile: 5 retries, 500ms base, 30s cap.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Fast recovery for latency-sensitive deployments: 3 retries, 100ms
    /// base, 5s cap.
    pub fn aggressive() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(50),
        }
    }

    /// Patient profile for flaky downstreams: 10 retries, 1s base, 60s
    /// cap.
    pub fn conservative() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(500),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another retry is allowed after `attempt` (0-indexed).
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before the retry that follows attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt.min(63) as i32);
        let raw_ms = self.base_delay.as_millis() as f64 * exp;
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64) as u64;

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };

        Duration::from_millis(capped_ms + jitter)
    }
}

/// Drives a unary async operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until success, a terminal error, or retry exhaustion.
    /// Exhaustion surfaces the last failure.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClass + std::fmt::Display,
    {
        self.run_observed(op, |_, _| {}).await
    }

    /// Like [`run`](Self::run), with `on_retry` observing every scheduled
    /// retry. The coordinator hangs its retry metrics off this hook.
    pub async fn run_observed<T, E, F, Fut>(
        &self,
        mut op: F,
        mut on_retry: impl FnMut(u32, &E),
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClass + std::fmt::Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && self.policy.can_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    on_retry(attempt, &err);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
