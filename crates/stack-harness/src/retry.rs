// crates/stack-harness/src/retry.rs
// ============================================================================
// Module: Retry
// Description: Bounded fixed-delay retry for fallible steps.
// Purpose: Share one retry loop between Terraform commands and HTTP checks.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`do_with_retry`] runs an action until it succeeds, reports a fatal error,
//! or exhausts the attempt budget. The action classifies each failure as
//! retryable or fatal through [`Attempt`]. Delays go through a [`Sleeper`] so
//! tests can observe them without waiting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::events::EVENT_RETRY;
use crate::events::EventOutcome;
use crate::events::StackEvent;
use crate::events::StackEventSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Attempt budget and delay for a retried step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (zero is treated as one).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub const fn from_retries(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries.saturating_add(1), delay)
    }

    /// Returns the attempt budget, never less than one.
    #[must_use]
    pub const fn effective_attempts(&self) -> u32 {
        if self.max_attempts == 0 { 1 } else { self.max_attempts }
    }
}

/// Failure classification returned by a retried action.
#[derive(Debug)]
pub enum Attempt<E> {
    /// The failure is transient; try again if budget remains.
    Retry(E),
    /// The failure is permanent; stop immediately.
    Fatal(E),
}

/// Error returned when a retried step does not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted {
        /// Step description.
        description: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },
    /// An attempt failed with a fatal error.
    Fatal {
        /// Step description.
        description: String,
        /// Attempt number that failed.
        attempt: u32,
        /// The fatal error.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Returns the number of attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted {
                attempts, ..
            } => *attempts,
            Self::Fatal {
                attempt, ..
            } => *attempt,
        }
    }

    /// Returns the underlying error of the last attempt.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted {
                last, ..
            } => last,
            Self::Fatal {
                error, ..
            } => error,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted {
                description,
                attempts,
                last,
            } => write!(f, "'{description}' unsuccessful after {attempts} attempts: {last}"),
            Self::Fatal {
                description,
                error,
                ..
            } => write!(f, "'{description}' failed with a non-retryable error: {error}"),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Exhausted {
                last, ..
            } => Some(last),
            Self::Fatal {
                error, ..
            } => Some(error),
        }
    }
}

// ============================================================================
// SECTION: Sleepers
// ============================================================================

/// Delay provider used between attempts.
pub trait Sleeper: Send + Sync {
    /// Blocks for the given duration.
    fn sleep(&self, duration: Duration);
}

/// Sleeper that blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ============================================================================
// SECTION: Retry Loop
// ============================================================================

/// Runs `action` until it succeeds, fails fatally, or exhausts the policy.
///
/// The action receives the one-based attempt number. No delay follows the
/// final attempt.
///
/// # Errors
///
/// Returns [`RetryError::Fatal`] on the first fatal failure and
/// [`RetryError::Exhausted`] when every attempt failed with a retryable error.
pub fn do_with_retry<T, E, F>(
    description: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    sink: &dyn StackEventSink,
    mut action: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(u32) -> Result<T, Attempt<E>>,
{
    let budget = policy.effective_attempts();
    let mut attempt = 1u32;
    loop {
        match action(attempt) {
            Ok(value) => return Ok(value),
            Err(Attempt::Fatal(error)) => {
                return Err(RetryError::Fatal {
                    description: description.to_string(),
                    attempt,
                    error,
                });
            }
            Err(Attempt::Retry(error)) => {
                if attempt >= budget {
                    sink.record(
                        &StackEvent::new(EVENT_RETRY, EventOutcome::Failed)
                            .with_subject(description)
                            .with_attempt(attempt)
                            .with_message(error.to_string()),
                    );
                    return Err(RetryError::Exhausted {
                        description: description.to_string(),
                        attempts: attempt,
                        last: error,
                    });
                }
                sink.record(
                    &StackEvent::new(EVENT_RETRY, EventOutcome::Retrying)
                        .with_subject(description)
                        .with_attempt(attempt)
                        .with_message(error.to_string()),
                );
                sleeper.sleep(policy.delay);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
