//! Retry-with-backoff as an explicit state machine.
//!
//! [`RetryState`] does no I/O and never sleeps: the caller runs an attempt,
//! reports the outcome and gets back what to do next.
//!
//! ```text
//! Attempting(1) --fail(retryable)--> Retry(delay) --> Attempting(2) ... Attempting(max)
//!      |                                                                  |
//!      +--succeed--> Succeeded                    fail / fail(fatal) --> Exhausted
//! ```

use std::time::Duration;

use netdeploy_core::{Backoff, ConnectionConfig};

/// Upper bound on any single delay, however many attempts exponential
/// backoff has doubled through.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. Never below 1.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay, config.backoff)
    }

    /// Delay after the `failures`-th failed attempt (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.checked_pow(failures.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.checked_mul(factor).unwrap_or(MAX_DELAY).min(MAX_DELAY)
            }
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 1,
            phase: Phase::Attempting,
        }
    }
}

/// What the caller should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then make attempt number [`RetryState::attempt`].
    Retry(Duration),
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attempting,
    Succeeded,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    phase: Phase,
}

impl RetryState {
    /// Current (or final) attempt number, 1-based.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn succeed(&mut self) {
        if self.phase == Phase::Attempting {
            self.phase = Phase::Succeeded;
        }
    }

    /// Record a failed attempt. A non-retryable failure ends the sequence
    /// regardless of attempts left.
    pub fn fail(&mut self, retryable: bool) -> RetryDecision {
        if self.phase != Phase::Attempting {
            return RetryDecision::Exhausted;
        }
        if !retryable || self.attempt >= self.policy.max_attempts {
            self.phase = Phase::Exhausted;
            return RetryDecision::Exhausted;
        }
        let delay = self.policy.delay_after(self.attempt);
        self.attempt += 1;
        RetryDecision::Retry(delay)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
