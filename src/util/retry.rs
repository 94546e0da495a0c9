//! Retry with capped exponential backoff.
//!
//! This is the single home of backoff math; every retrying caller in the
//! crate goes through [`RetryExecutor`].

use std::future::Future;
use std::time::Duration;

use bon::Builder;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connectivity::ConnectivityMonitor;
use crate::error::{AppError, ErrorSource, SubtrackError};

/// Substrings (case-insensitive) that mark a failure as worth retrying.
pub const DEFAULT_RETRYABLE_PATTERNS: [&str; 16] = [
    "network",
    "fetch",
    "timeout",
    "timed out",
    "offline",
    "connection",
    "econnreset",
    "econnrefused",
    "enotfound",
    "socket hang up",
    "error sending request",
    "too many requests",
    "status 429",
    "status 502",
    "status 503",
    "status 504",
];

fn default_retryable_patterns() -> Vec<String> {
    DEFAULT_RETRYABLE_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

/// Retry policy configuration. Any field may be overridden per call.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    #[builder(default = 3)]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[builder(default = Duration::from_millis(1000))]
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    #[builder(default = Duration::from_secs(10))]
    pub max_delay: Duration,
    #[builder(default = 2.0)]
    pub backoff_multiplier: f64,
    #[builder(default = default_retryable_patterns())]
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs < 0.0 {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Whether an error message matches one of the retryable patterns.
    pub fn is_retryable(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_patterns
            .iter()
            .any(|pattern| message.contains(&pattern.to_lowercase()))
    }

    fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub succeeded: bool,
    pub value: Option<T>,
    pub error: Option<AppError>,
    pub attempts_made: u32,
    /// Wall-clock time across all attempts, delays included.
    pub elapsed: Duration,
}

impl<T> RetryOutcome<T> {
    fn success(value: T, attempts_made: u32, started: Instant) -> Self {
        Self {
            succeeded: true,
            value: Some(value),
            error: None,
            attempts_made,
            elapsed: started.elapsed(),
        }
    }

    fn failure(error: AppError, attempts_made: u32, started: Instant) -> Self {
        Self {
            succeeded: false,
            value: None,
            error: Some(error),
            attempts_made,
            elapsed: started.elapsed(),
        }
    }

    /// Collapse into a `Result`.
    pub fn into_result(self) -> Result<T, AppError> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(AppError::from_failure(
                SubtrackError::InvalidState("retry finished without a result".into()),
                None,
            )),
        }
    }
}

/// Runs async operations under a retry policy.
///
/// When a [`ConnectivityMonitor`] is attached and reports offline, an
/// attempt fails fast with an offline error instead of invoking the
/// operation.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    connectivity: Option<ConnectivityMonitor>,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connectivity(monitor: ConnectivityMonitor) -> Self {
        Self {
            connectivity: Some(monitor),
        }
    }

    /// Execute `operation` with retry.
    pub async fn run<F, Fut, T, E>(
        &self,
        operation: F,
        policy: &RetryPolicy,
        context: &str,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ErrorSource>,
    {
        self.run_with_cancel(operation, policy, context, &CancellationToken::new())
            .await
    }

    /// Execute `operation` with retry, aborting attempts and delays when
    /// `cancel` fires.
    pub async fn run_with_cancel<F, Fut, T, E>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
        context: &str,
        cancel: &CancellationToken,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ErrorSource>,
    {
        let started = Instant::now();
        let max_attempts = policy.effective_attempts();
        let cancelled = |attempt| {
            RetryOutcome::failure(
                AppError::from_failure(SubtrackError::Cancelled, Some(context)),
                attempt,
                started,
            )
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return cancelled(attempt);
            }

            let result: Result<T, ErrorSource> = if self.is_offline() {
                Err(SubtrackError::Offline.into())
            } else {
                let attempt_future = operation();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return cancelled(attempt),
                    result = attempt_future => result.map_err(Into::into),
                }
            };

            let source = match result {
                Ok(value) => return RetryOutcome::success(value, attempt, started),
                Err(source) => source,
            };

            if !policy.is_retryable(source.message()) || attempt >= max_attempts {
                tracing::debug!(
                    attempt,
                    max_attempts,
                    context,
                    error = source.message(),
                    "Giving up"
                );
                return RetryOutcome::failure(
                    AppError::from_failure(source, Some(context)),
                    attempt,
                    started,
                );
            }

            let delay = policy.delay_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                context,
                error = source.message(),
                "Retrying after error"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(attempt),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn is_offline(&self) -> bool {
        self.connectivity
            .as_ref()
            .map(|monitor| !monitor.is_online())
            .unwrap_or(false)
    }
}
