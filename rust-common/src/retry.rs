//! Retry policy implementation with exponential backoff.
//!
//! Besides the classic "retry N times" loop, the policy can compute a delay
//! that must fit inside a remaining time budget, which is what lease renewal
//! needs: a retry that would land after the lease expires is pointless.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    /// `true` for transient failures (network, rate limiting, 5xx).
    fn is_retryable(&self) -> bool;
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries, jitter included
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add up to 25% jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set max retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Retry policy for executing operations with automatic retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Calculate the delay for a given attempt number (0-based).
    ///
    /// Exponential in `attempt`, jittered when enabled, and never above
    /// `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let max_secs = self.config.max_delay.as_secs_f64();
        let base = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);

        let jittered = if self.config.jitter {
            base * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            base
        };

        if jittered.is_finite() && jittered < max_secs {
            Duration::from_secs_f64(jittered.max(0.0))
        } else {
            self.config.max_delay
        }
    }

    /// Delay for `attempt`, or `None` when it would not end strictly inside
    /// `remaining`.
    #[must_use]
    pub fn delay_within(&self, attempt: u32, remaining: Duration) -> Option<Duration> {
        let delay = self.delay_for_attempt(attempt);
        (delay < remaining).then_some(delay)
    }

    /// Check if an error should be retried.
    #[must_use]
    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Execute an async operation, retrying retryable errors.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once all
    /// retries are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Get the configured delay cap.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.config.max_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}
