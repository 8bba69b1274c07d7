//! Retry Policy Engine.
//!
//! Wraps one invocation in a bounded attempt loop:
//!
//! ```text
//! Attempting(n) --ok--> Done
//! Attempting(n) --err, n < maxRetryCount--> sleep(delayInterval) --> Attempting(n + 1)
//! Attempting(n) --err, n >= maxRetryCount--> Failed(last error)
//! ```
//!
//! All state lives on the stack of the invocation that owns the loop.

use std::future::Future;
use std::time::Duration;

use fnhost_types::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::InvocationError;

/// State of one invocation's retry loop.
#[derive(Debug)]
pub enum RetryState {
    /// About to run the zero-based attempt.
    Attempting(u32),
    Done,
    Failed(InvocationError),
}

/// Result of driving a retry loop to a terminal state.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub outcome: Result<T, InvocationError>,
    /// Number of attempts that ran.
    pub attempts: u32,
    /// One entry per delay waited between attempts.
    pub delays: Vec<Duration>,
}

/// Applies a function's retry policy to its attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryEngine {
    policy: Option<RetryPolicy>,
}

impl RetryEngine {
    pub fn new(policy: Option<RetryPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> Option<&RetryPolicy> {
        self.policy.as_ref()
    }

    fn max_retry_count(&self) -> u32 {
        self.policy.as_ref().map(|policy| policy.max_retry_count).unwrap_or(0)
    }

    fn delay_interval(&self) -> Duration {
        self.policy.as_ref().map(|policy| policy.delay_interval).unwrap_or_default()
    }

    /// Next state after attempt `attempt` failed with `error`.
    pub fn transition(&self, attempt: u32, error: InvocationError) -> RetryState {
        if !error.is_retryable() {
            return RetryState::Failed(error);
        }
        if attempt < self.max_retry_count() {
            return RetryState::Attempting(attempt + 1);
        }
        match self.policy {
            Some(_) => RetryState::Failed(InvocationError::ExhaustedRetries {
                attempts: attempt + 1,
                last: Box::new(error),
            }),
            None => RetryState::Failed(error),
        }
    }

    /// Run `attempt` until it succeeds or the policy gives up.
    ///
    /// A cancelled `abort` token interrupts the delay between attempts and ends the
    /// loop with [`InvocationError::Aborted`].
    pub async fn run<T, F, Fut>(&self, abort: &CancellationToken, mut attempt: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, InvocationError>>,
    {
        let mut delays = Vec::new();
        let mut current = 0u32;

        loop {
            let error = match attempt(current).await {
                Ok(value) => {
                    if current > 0 {
                        info!(attempts = current + 1, "invocation succeeded after retry");
                    }
                    return RetryReport {
                        outcome: Ok(value),
                        attempts: current + 1,
                        delays,
                    };
                }
                Err(error) => error,
            };

            match self.transition(current, error) {
                RetryState::Attempting(next) => {
                    let delay = self.delay_interval();
                    warn!(attempt = current, next_attempt = next, delay_ms = delay.as_millis() as u64, "attempt failed; retry scheduled");
                    tokio::select! {
                        _ = abort.cancelled() => {
                            return RetryReport {
                                outcome: Err(InvocationError::Aborted),
                                attempts: current + 1,
                                delays,
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delays.push(delay);
                    current = next;
                }
                RetryState::Failed(error) => {
                    if matches!(error, InvocationError::ExhaustedRetries { .. }) {
                        warn!(attempts = current + 1, "retries exhausted");
                    }
                    return RetryReport {
                        outcome: Err(error),
                        attempts: current + 1,
                        delays,
                    };
                }
                RetryState::Done => unreachable!("a failed attempt never transitions to Done"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::HandlerError;

    fn policy(max_retry_count: u32) -> RetryEngine {
        RetryEngine::new(Some(RetryPolicy::fixed_delay(max_retry_count, Duration::from_secs(5))))
    }

    /// Fails the first two attempts, succeeds afterwards.
    async fn flaky(attempt: u32) -> Result<&'static str, InvocationError> {
        if attempt < 2 {
            Err(HandlerError::new(format!("attempt {attempt} failed")).into())
        } else {
            Ok("done")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_policy() {
        let report = policy(3).run(&CancellationToken::new(), flaky).await;
        assert_eq!(report.outcome.unwrap(), "done");
        assert_eq!(report.attempts, 3);
        assert_eq!(report.delays, vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_policy_is_exhausted() {
        let report = policy(1).run(&CancellationToken::new(), flaky).await;
        assert_eq!(report.attempts, 2);
        assert_eq!(report.delays.len(), 1);
        match report.outcome.unwrap_err() {
            InvocationError::ExhaustedRetries { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, InvocationError::Handler(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn no_policy_surfaces_the_first_error() {
        let report = RetryEngine::new(None).run(&CancellationToken::new(), flaky).await;
        assert_eq!(report.attempts, 1);
        assert!(report.delays.is_empty());
        assert!(matches!(report.outcome, Err(InvocationError::Handler(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let report = policy(3)
            .run(&CancellationToken::new(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(InvocationError::from(HandlerError::permanent("bad input"))) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(report.outcome, Err(InvocationError::Handler(ref error)) if !error.is_retryable()));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_interrupts_the_delay() {
        let abort = CancellationToken::new();
        let trigger = abort.clone();
        let report = policy(3)
            .run(&abort, move |_| {
                trigger.cancel();
                async { Err::<(), _>(InvocationError::from(HandlerError::new("flaky"))) }
            })
            .await;
        assert_eq!(report.attempts, 1);
        assert!(matches!(report.outcome, Err(InvocationError::Aborted)));
    }

    #[test]
    fn transition_follows_the_state_machine() {
        let engine = policy(2);
        assert!(matches!(engine.transition(0, HandlerError::new("x").into()), RetryState::Attempting(1)));
        assert!(matches!(engine.transition(1, HandlerError::new("x").into()), RetryState::Attempting(2)));
        assert!(matches!(
            engine.transition(2, HandlerError::new("x").into()),
            RetryState::Failed(InvocationError::ExhaustedRetries { attempts: 3, .. })
        ));
    }
}
