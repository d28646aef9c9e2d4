//! Retry policy for flaky external calls.
//!
//! Every external call attempt is classified into a [`QueryOutcome`]. The
//! [`RetryPolicy`] re-runs retryable failures with a backoff delay and gives
//! up with a terminal failure once its attempts are spent.

use crate::error::PipelineError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Result of one (or a bounded series of) external call attempts.
#[derive(Debug, Clone)]
pub enum QueryOutcome<T> {
    Success(T),
    RetryableFailure(PipelineError),
    TerminalFailure(PipelineError),
}

impl<T> QueryOutcome<T> {
    /// Classify a call result by error kind using [`PipelineError::is_retryable`].
    pub fn classify(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.is_retryable() => Self::RetryableFailure(err),
            Err(err) => Self::TerminalFailure(err),
        }
    }

    /// Classify a call result treating every error as retryable.
    pub fn uniform(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::RetryableFailure(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Collapse the outcome back into a plain result.
    pub fn into_result(self) -> Result<T, PipelineError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::RetryableFailure(err) | Self::TerminalFailure(err) => Err(err),
        }
    }

    pub fn ok(self) -> Option<T> {
        self.into_result().ok()
    }
}

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial * multiplier^(n-1)` before retry `n`, capped at `max`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(32) as i32;
                let scaled = initial.as_secs_f64() * multiplier.max(1.0).powi(exponent);
                if scaled >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(scaled)
                }
            }
        }
    }
}

/// Which failures are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Every error is retried
    AnyError,
    /// Only errors whose kind is transient
    Transient,
}

/// Bounded retry with backoff around one external call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retry_on: RetryOn::Transient,
        }
    }

    /// WHOIS default: 5 attempts, 500 ms apart, every error retried.
    pub fn whois_default() -> Self {
        Self::new(5, Backoff::Fixed(Duration::from_millis(500))).retry_on(RetryOn::AnyError)
    }

    pub fn retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> QueryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let retry_on = self.retry_on;
        self.execute_classified(move || {
            let attempt = operation();
            async move {
                let result = attempt.await;
                match retry_on {
                    RetryOn::AnyError => QueryOutcome::uniform(result),
                    RetryOn::Transient => QueryOutcome::classify(result),
                }
            }
        })
        .await
    }

    /// Like [`RetryPolicy::execute`], for operations that classify their own outcome.
    pub async fn execute_classified<T, F, Fut>(&self, mut operation: F) -> QueryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QueryOutcome<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                QueryOutcome::Success(value) => return QueryOutcome::Success(value),
                QueryOutcome::TerminalFailure(err) => return QueryOutcome::TerminalFailure(err),
                QueryOutcome::RetryableFailure(err) => {
                    if attempt >= max_attempts {
                        debug!("giving up after {} attempts: {}", attempt, err);
                        return QueryOutcome::TerminalFailure(err);
                    }

                    let delay = self.backoff.delay(attempt);
                    debug!(
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        attempt, max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::whois_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_first_success_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::whois_default();
        let start = Instant::now();

        let counter = Arc::clone(&calls);
        let outcome = policy
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, PipelineError>(7) }
            })
            .await;

        assert!(matches!(outcome, QueryOutcome::Success(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_become_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::whois_default();
        let start = Instant::now();

        let counter = Arc::clone(&calls);
        let outcome: QueryOutcome<()> = policy
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::parse("no expiration date")) }
            })
            .await;

        assert!(matches!(outcome, QueryOutcome::TerminalFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // Four gaps between five attempts
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(100)));

        let counter = Arc::clone(&calls);
        let outcome = policy
            .execute(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PipelineError::timeout("query", Duration::from_secs(1)))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(outcome.ok(), Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(100)));

        let counter = Arc::clone(&calls);
        let outcome: QueryOutcome<()> = policy
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::no_records("example.com", "MX")) }
            })
            .await;

        assert!(matches!(outcome, QueryOutcome::TerminalFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delays() {
        let fixed = Backoff::Fixed(Duration::from_millis(500));
        assert_eq!(fixed.delay(1), Duration::from_millis(500));
        assert_eq!(fixed.delay(4), Duration::from_millis(500));

        let exp = Backoff::Exponential {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_millis(350),
        };
        assert_eq!(exp.delay(1), Duration::from_millis(100));
        assert_eq!(exp.delay(2), Duration::from_millis(200));
        assert_eq!(exp.delay(3), Duration::from_millis(350));
    }

    #[test]
    fn test_outcome_classification() {
        let transient: QueryOutcome<()> =
            QueryOutcome::classify(Err(PipelineError::dns("a.test", "A", "SERVFAIL")));
        assert!(matches!(transient, QueryOutcome::RetryableFailure(_)));

        let permanent: QueryOutcome<()> =
            QueryOutcome::classify(Err(PipelineError::no_records("a.test", "A")));
        assert!(matches!(permanent, QueryOutcome::TerminalFailure(_)));

        let uniform: QueryOutcome<()> =
            QueryOutcome::uniform(Err(PipelineError::no_records("a.test", "A")));
        assert!(matches!(uniform, QueryOutcome::RetryableFailure(_)));
    }
}
