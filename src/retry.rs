//! Bounded retry with exponential backoff around fallible async operations.
//!
//! A [`RetryPolicy`] says how many attempts are allowed, how long to wait
//! between them, and which errors are worth another attempt. [`execute`] runs
//! an operation under a policy. It keeps no state between calls, so the same
//! policy can drive the download and the analyzer concurrently or in turn.
//!
//! Disposition of a failure:
//!
//! - **fatal**: returned as-is immediately; no sleep, no further attempt.
//! - **retryable**: sleep and try again while attempts remain, otherwise fail
//!   with [`PipelineError::RetryExhausted`] wrapping the last error.

use crate::error::{PipelineError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Worth another attempt. `retry_after` carries a server-provided hint.
    Retryable { retry_after: Option<Duration> },
    /// Surface immediately.
    Fatal,
}

impl Disposition {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Disposition::Retryable { .. })
    }
}

/// Type alias for the error classifier used in [`RetryPolicy`].
pub type ClassifierFn = Arc<dyn Fn(&PipelineError) -> Disposition + Send + Sync>;

/// Type alias for the callback invoked before each retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// Jitter strategy to spread out retries from concurrent invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    None,

    /// Full jitter: random value in `[0, calculated_delay]`.
    Full,

    /// Equal jitter: `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

/// Retry configuration plus the classifier deciding what is retryable.
///
/// # Example
///
/// ```
/// use bulletin_digest::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3)
///     .with_base_delay(Duration::from_millis(500))
///     .with_multiplier(2.0);
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    max_attempts: u32,

    /// Delay after the first failed attempt. Default: 1 second.
    base_delay: Duration,

    /// Multiplier applied per attempt. `1.0` gives a fixed delay. Default: 2.0.
    multiplier: f64,

    /// Upper bound for any single delay. Default: 60 seconds.
    max_delay: Duration,

    /// Default: [`JitterStrategy::None`].
    jitter: JitterStrategy,

    /// Use the server's `Retry-After` hint instead of the computed delay.
    /// Default: `true`.
    respect_retry_after: bool,

    /// Maps an error to a [`Disposition`]. Default: [`PipelineError::disposition`].
    classifier: ClassifierFn,
}

impl RetryPolicy {
    /// A policy allowing `max_attempts` attempts (clamped to at least 1).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::None,
            respect_retry_after: true,
            classifier: Arc::new(PipelineError::disposition),
        }
    }

    /// Exactly one attempt; failures surface unchanged.
    pub fn once() -> Self {
        Self::new(1)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn ignoring_retry_after(mut self) -> Self {
        self.respect_retry_after = false;
        self
    }

    /// Replace the error classifier.
    pub fn with_classifier(
        mut self,
        f: impl Fn(&PipelineError) -> Disposition + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Arc::new(f);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> JitterStrategy {
        self.jitter
    }

    pub fn respects_retry_after(&self) -> bool {
        self.respect_retry_after
    }

    pub fn classify(&self, error: &PipelineError) -> Disposition {
        (self.classifier)(error)
    }

    /// Delay after failed attempt N (1-indexed).
    ///
    /// `base_delay * multiplier^(attempt-1)`, capped at `max_delay`, then
    /// jittered according to the configured strategy.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if base.is_nan() {
            0.0
        } else {
            base.min(self.max_delay.as_secs_f64())
        };

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::try_from_secs_f64(jittered.max(0.0)).unwrap_or(self.max_delay)
    }

    /// Delay before the next attempt, honoring a `Retry-After` hint if allowed.
    fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => hint.min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("respect_retry_after", &self.respect_retry_after)
            .finish()
    }
}

impl PipelineError {
    /// Default classification used by [`RetryPolicy`].
    ///
    /// Retryable:
    /// - [`PipelineError::Request`] (connection, reset, transport timeout)
    /// - [`PipelineError::HttpError`] with 408, 429 or a 5xx status
    /// - [`PipelineError::Timeout`], [`PipelineError::EmptyResponse`],
    ///   [`PipelineError::MalformedResponse`]
    ///
    /// Everything else (401/403 and other 4xx, local I/O, configuration,
    /// conversion, parse) is fatal.
    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineError::Request(e) if e.is_builder() => Disposition::Fatal,
            PipelineError::Request(_) => Disposition::Retryable { retry_after: None },
            PipelineError::HttpError {
                status,
                retry_after,
                ..
            } => match status {
                408 | 429 | 500..=599 => Disposition::Retryable {
                    retry_after: *retry_after,
                },
                _ => Disposition::Fatal,
            },
            PipelineError::Timeout { .. }
            | PipelineError::EmptyResponse(_)
            | PipelineError::MalformedResponse(_) => Disposition::Retryable { retry_after: None },
            _ => Disposition::Fatal,
        }
    }
}

/// Run `operation` under `policy`.
///
/// Attempt 1 runs immediately. A fatal failure is returned unchanged; a
/// retryable one is followed by a delay and another attempt until the policy's
/// attempts are used up, at which point the last error is wrapped in
/// [`PipelineError::RetryExhausted`].
///
/// `label` names the operation in logs. `on_retry` is called before each
/// delay with `(next_attempt, delay, reason)`.
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    mut on_retry: RetryCallback<'_>,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let retry_after = match policy.classify(&error) {
            Disposition::Fatal => {
                tracing::debug!(operation = label, attempt, error = %error, "fatal error, not retrying");
                return Err(error);
            }
            Disposition::Retryable { retry_after } => retry_after,
        };

        if attempt >= policy.max_attempts {
            tracing::warn!(operation = label, attempts = attempt, error = %error, "retries exhausted");
            return Err(PipelineError::RetryExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = policy.next_delay(attempt, retry_after);
        let reason = error.to_string();
        tracing::warn!(
            operation = label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %reason,
            "attempt failed, retrying"
        );

        if let Some(ref mut cb) = on_retry {
            cb(attempt + 1, delay, &reason);
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}
