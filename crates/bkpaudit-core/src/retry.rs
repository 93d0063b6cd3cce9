//! Bounded retry for transient storage and file operations.

use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::CancellationToken;

/// Granularity at which a retry pause re-checks cancellation.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Cancellation was observed before or between attempts
    #[error("interrupted by cancellation")]
    Interrupted,

    /// Every attempt failed; carries the last failure
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RetryError::Interrupted)
    }
}

/// Fixed-delay retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// Cancellation is checked before every attempt and during pauses; once
    /// observed no further attempt is made.
    pub fn run<T, E, F>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                info!(operation = what, "interrupted before attempt");
                return Err(RetryError::Interrupted);
            }
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => {
                    return Err(RetryError::Exhausted { attempts, last: err });
                }
                Err(err) => {
                    warn!(
                        operation = what,
                        attempt,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    if !self.pause(cancel) {
                        info!(operation = what, "interrupted during retry pause");
                        return Err(RetryError::Interrupted);
                    }
                }
            }
        }
    }

    /// Sleep for `delay`, returning `false` if cancelled meanwhile.
    fn pause(&self, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + self.delay;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }
}
