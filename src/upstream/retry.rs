//! # Retry Policy
//!
//! Retrying is modelled as an explicit state machine instead of a loop with
//! `continue`. [`RetryPolicy::next`] is a pure function from the current
//! [`RetryState`] and a [`RetryEvent`] to the next state; the client only
//! performs the I/O (one HTTP attempt, or one backoff sleep) that the current
//! state asks for.
//!
//! ```text
//! Attempting(n) --Succeeded-------------------------> Succeeded
//! Attempting(n) --Failed, retryable, n < max-------> Backoff(n, delay)
//! Attempting(n) --Failed, otherwise-----------------> Exhausted(n)
//! Backoff(n, _) --BackoffElapsed--------------------> Attempting(n + 1)
//! ```

use super::UpstreamError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Factor applied to the delay after each further failure
    pub backoff_multiplier: f64,

    /// Retry 4xx responses too. 408 and 429 are always retried.
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            retry_client_errors: true,
        }
    }
}

/// Where a fetch currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `n` (1-based) is due
    Attempting(u32),
    /// Attempt `attempt` failed; wait `delay` before the next one
    Backoff { attempt: u32, delay: Duration },
    Succeeded,
    Exhausted { attempts: u32 },
}

/// What happened since the last transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    Succeeded,
    Failed { retryable: bool },
    BackoffElapsed,
}

impl RetryPolicy {
    /// Initial state of every fetch
    pub fn start(&self) -> RetryState {
        RetryState::Attempting(1)
    }

    /// Pure transition function
    pub fn next(&self, state: RetryState, event: RetryEvent) -> RetryState {
        match (state, event) {
            (RetryState::Attempting(_), RetryEvent::Succeeded) => RetryState::Succeeded,
            (RetryState::Attempting(attempt), RetryEvent::Failed { retryable }) => {
                if retryable && attempt < self.max_attempts {
                    RetryState::Backoff {
                        attempt,
                        delay: self.delay_after(attempt),
                    }
                } else {
                    RetryState::Exhausted { attempts: attempt }
                }
            }
            (RetryState::Backoff { attempt, .. }, RetryEvent::BackoffElapsed) => {
                RetryState::Attempting(attempt + 1)
            }
            // Terminal states absorb everything; out-of-order events leave the state as is.
            (state, _) => state,
        }
    }

    /// Wait after failed attempt `attempt`: base * multiplier^(attempt - 1)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        self.base_delay.mul_f64(factor)
    }

    /// Whether a failed attempt may be retried at all
    pub fn is_retryable(&self, failure: &UpstreamError) -> bool {
        match failure {
            UpstreamError::Transport { .. } => true,
            UpstreamError::Status { status } => match *status {
                408 | 429 => true,
                400..=499 => self.retry_client_errors,
                _ => true,
            },
            UpstreamError::Exhausted { .. } | UpstreamError::InvalidRequest { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_fail_fail_succeed() {
        let policy = RetryPolicy::default();
        let failed = RetryEvent::Failed { retryable: true };

        let state = policy.start();
        assert_eq!(state, RetryState::Attempting(1));

        let state = policy.next(state, failed);
        assert_eq!(
            state,
            RetryState::Backoff { attempt: 1, delay: Duration::from_millis(500) }
        );
        let state = policy.next(state, RetryEvent::BackoffElapsed);
        assert_eq!(state, RetryState::Attempting(2));

        let state = policy.next(state, failed);
        assert_eq!(
            state,
            RetryState::Backoff { attempt: 2, delay: Duration::from_millis(1000) }
        );
        let state = policy.next(state, RetryEvent::BackoffElapsed);
        assert_eq!(state, RetryState::Attempting(3));

        assert_eq!(policy.next(state, RetryEvent::Succeeded), RetryState::Succeeded);
    }

    #[test]
    fn test_exhaustion_without_trailing_backoff() {
        let policy = RetryPolicy::default();
        let failed = RetryEvent::Failed { retryable: true };

        let state = policy.next(RetryState::Attempting(3), failed);
        assert_eq!(state, RetryState::Exhausted { attempts: 3 });
        assert_eq!(policy.next(state, RetryEvent::BackoffElapsed), state);
    }

    #[test]
    fn test_non_retryable_failure_is_terminal() {
        let policy = RetryPolicy::default();
        let state = policy.next(RetryState::Attempting(1), RetryEvent::Failed { retryable: false });
        assert_eq!(state, RetryState::Exhausted { attempts: 1 });
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        let state = policy.next(policy.start(), RetryEvent::Failed { retryable: true });
        assert_eq!(state, RetryState::Exhausted { attempts: 1 });
    }

    #[test]
    fn test_status_classification() {
        let baseline = RetryPolicy::default();
        assert!(baseline.is_retryable(&UpstreamError::Status { status: 500 }));
        assert!(baseline.is_retryable(&UpstreamError::Status { status: 404 }));
        assert!(baseline.is_retryable(&UpstreamError::transport("connection reset")));

        let strict = RetryPolicy {
            retry_client_errors: false,
            ..Default::default()
        };
        assert!(!strict.is_retryable(&UpstreamError::Status { status: 400 }));
        assert!(!strict.is_retryable(&UpstreamError::Status { status: 404 }));
        assert!(strict.is_retryable(&UpstreamError::Status { status: 429 }));
        assert!(strict.is_retryable(&UpstreamError::Status { status: 503 }));
    }
}
