use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Default attempt budget for every external call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Classifies collaborator errors for the retry governor
pub trait Retryable: std::fmt::Display {
    /// Transient errors are retried; anything else is surfaced immediately
    fn is_transient(&self) -> bool;
}

/// Bounded-attempt policy applied to a single external call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// A call running past this is abandoned and counted as a transient failure
    pub call_timeout: Option<Duration>,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            call_timeout: Some(Duration::from_secs(30)),
            backoff: Duration::ZERO,
        }
    }
}

/// Attempt bookkeeping for one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts: u32,
    pub last_failure: Option<String>,
}

/// Retry bookkeeping for a single pipeline run, keyed by stage or candidate
///
/// Each key is only ever written by the unit of work that owns it. The lock is
/// never held across an await.
#[derive(Debug, Default)]
pub struct RetryLedger {
    states: Mutex<BTreeMap<String, RetryState>>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_states<R>(&self, f: impl FnOnce(&mut BTreeMap<String, RetryState>) -> R) -> R {
        let mut states = self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut states)
    }

    /// Record a failed attempt and return the attempt count so far
    pub fn record_failure(&self, key: &str, message: &str) -> u32 {
        self.with_states(|states| {
            let state = states.entry(key.to_string()).or_default();
            state.attempts += 1;
            state.last_failure = Some(message.to_string());
            state.attempts
        })
    }

    /// Reset the counter after a success
    pub fn record_success(&self, key: &str) {
        self.with_states(|states| {
            let state = states.entry(key.to_string()).or_default();
            state.attempts = 0;
            state.last_failure = None;
        })
    }

    pub fn get(&self, key: &str) -> Option<RetryState> {
        self.with_states(|states| states.get(key).cloned())
    }

    pub fn snapshot(&self) -> BTreeMap<String, RetryState> {
        self.with_states(|states| states.clone())
    }
}

/// Terminal result of a governed call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The collaborator reported a non-transient error; no retry was attempted
    Fatal(E),
    /// Every attempt failed transiently
    Exhausted { attempts: u32, last_failure: String },
}

/// Wraps a single external call with the attempt budget and per-call timeout
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryGovernor {
    policy: RetryPolicy,
}

impl RetryGovernor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// `call` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        key: &str,
        ledger: &RetryLedger,
        mut call: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Retryable,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match self.policy.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, call(attempt)).await {
                    Ok(result) => result.map_err(Failure::Call),
                    Err(_) => Err(Failure::TimedOut(limit)),
                },
                None => call(attempt).await.map_err(Failure::Call),
            };

            let message = match outcome {
                Ok(value) => {
                    ledger.record_success(key);
                    return Ok(value);
                }
                Err(Failure::Call(err)) if !err.is_transient() => {
                    tracing::debug!("{} failed permanently: {}", key, err);
                    return Err(RetryError::Fatal(err));
                }
                Err(Failure::Call(err)) => err.to_string(),
                Err(Failure::TimedOut(limit)) => {
                    format!("call timed out after {}ms", limit.as_millis())
                }
            };

            let attempts = ledger.record_failure(key, &message);

            if attempt >= max_attempts {
                tracing::warn!(
                    "{} failed after {} attempt(s), giving up: {}",
                    key,
                    attempts,
                    message
                );
                return Err(RetryError::Exhausted {
                    attempts,
                    last_failure: message,
                });
            }

            tracing::warn!(
                "{} failed (attempt {}/{}), retrying: {}",
                key,
                attempt,
                max_attempts,
                message
            );

            if !self.policy.backoff.is_zero() {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }
    }
}

enum Failure<E> {
    Call(E),
    TimedOut(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Gone,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Flaky => write!(f, "flaky"),
                TestError::Gone => write!(f, "gone"),
            }
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn governor() -> RetryGovernor {
        RetryGovernor::new(RetryPolicy {
            max_attempts: 2,
            call_timeout: Some(Duration::from_secs(1)),
            backoff: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_fails_once_then_succeeds() {
        let ledger = RetryLedger::new();
        let calls = AtomicU32::new(0);

        let result = governor()
            .run("resolve", &ledger, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TestError::Flaky)
                    } else {
                        Ok("profile")
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some("profile"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.get("resolve").unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_always_failing_uses_whole_budget() {
        let ledger = RetryLedger::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = governor()
            .run("discover", &ledger, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Flaky) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(RetryError::Exhausted { attempts, last_failure }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_failure, "flaky");
            }
            other => panic!("expected exhaustion, got {:?}", other.map_err(|_| ())),
        }
        let state = ledger.get("discover").unwrap();
        assert_eq!(state.attempts, 2);
        assert_eq!(state.last_failure.as_deref(), Some("flaky"));
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let ledger = RetryLedger::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = governor()
            .run("resolve", &ledger, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Gone) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Fatal(TestError::Gone))));
        assert!(ledger.get("resolve").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let ledger = RetryLedger::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<TestError>> = governor()
            .run("evaluate:NCT001", &ledger, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(RetryError::Exhausted { attempts, last_failure }) => {
                assert_eq!(attempts, 2);
                assert!(last_failure.contains("timed out"));
            }
            _ => panic!("expected exhaustion by timeout"),
        }
    }

    #[tokio::test]
    async fn test_zero_budget_still_calls_once() {
        let ledger = RetryLedger::new();
        let governor = RetryGovernor::new(RetryPolicy {
            max_attempts: 0,
            call_timeout: None,
            backoff: Duration::ZERO,
        });

        let result: Result<u8, RetryError<TestError>> =
            governor.run("k", &ledger, |_| async { Ok(7) }).await;
        assert_eq!(result.ok(), Some(7));
    }
}
