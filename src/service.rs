//! Failures of external collaborators and the policy for retrying them.

use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// An error returned by an external service (liftover oracle, annotation
/// lookup, or sequence source).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServiceError {
    /// The service could not be reached.
    Unavailable(String),

    /// The service did not answer in time.
    Timeout(Duration),

    /// The service refused the request. Retrying will not help.
    Rejected(String),
}

impl ServiceError {
    /// Whether or not retrying the request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_) | ServiceError::Timeout(_))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Unavailable(msg) => write!(f, "service unavailable: {msg}"),
            ServiceError::Timeout(duration) => {
                write!(f, "service timed out after {}ms", duration.as_millis())
            }
            ServiceError::Rejected(msg) => write!(f, "service rejected request: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Whether an error may go away on retry.
pub trait Transient {
    /// Returns `true` if the operation should be retried.
    fn is_transient(&self) -> bool;
}

impl Transient for ServiceError {
    fn is_transient(&self) -> bool {
        ServiceError::is_transient(self)
    }
}

/// A bounded retry policy with exponential backoff.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// The maximum number of attempts (including the first).
    pub max_attempts: u32,

    /// The delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,

    /// The factor the delay grows by after each failed attempt.
    pub multiplier: u32,

    /// The overall time budget across all attempts, in milliseconds.
    pub deadline_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 100,
            multiplier: 2,
            deadline_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            multiplier: 1,
            deadline_ms: 0,
        }
    }

    /// Gets the delay to wait after the `attempt`th failure (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use orfdb::service::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(100));
    /// assert_eq!(policy.backoff(3), Duration::from_millis(400));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempts or the
    /// deadline are exhausted. The last error is returned on failure.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let started = Instant::now();
        let deadline = Duration::from_millis(self.deadline_ms);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let exhausted = attempt >= self.max_attempts.max(1);

                    if !err.is_transient() || exhausted {
                        return Err(err);
                    }

                    let delay = self.backoff(attempt);
                    if started.elapsed() + delay > deadline {
                        return Err(err);
                    }

                    debug!("{what}: attempt {attempt} failed ({err}), retrying in {delay:?}");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
