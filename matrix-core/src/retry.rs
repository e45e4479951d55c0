//! Bounded retry policies
//!
//! Every wait in the pipeline (container readiness, build-status polling,
//! health checks, transient HTTP failures) is expressed as a `RetryPolicy`
//! instead of an ad hoc sleep loop. Schedules run on `tokio::time`, so tests
//! drive them with a paused clock.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Interval growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles after every attempt, capped at `max_interval`
    Exponential,
}

/// Attempt budget, interval and optional overall deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff: Backoff,
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed interval, bounded by attempts
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: interval,
            max_interval: interval,
            backoff: Backoff::Fixed,
            deadline: None,
        }
    }

    /// Doubling interval, bounded by attempts
    pub fn exponential(initial: Duration, max_interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: initial,
            max_interval: max_interval.max(initial),
            backoff: Backoff::Exponential,
            deadline: None,
        }
    }

    /// Fixed interval, bounded only by an overall deadline
    pub fn until(interval: Duration, deadline: Duration) -> Self {
        Self::fixed(interval, u32::MAX).with_deadline(deadline)
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Delay before the attempt following attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.initial_interval,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.initial_interval
                    .saturating_mul(factor)
                    .min(self.max_interval)
            }
        }
    }

    /// Starts a schedule; the clock starts now
    pub fn start(&self) -> RetrySchedule {
        RetrySchedule {
            policy: self.clone(),
            attempts: 0,
            started: Instant::now(),
        }
    }
}

/// A running retry schedule
#[derive(Debug)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts: u32,
    started: Instant,
}

impl RetrySchedule {
    /// Waits for the next attempt slot
    ///
    /// The first call always grants an attempt without waiting. Later calls
    /// sleep for the policy interval and return false once the attempt budget
    /// or the deadline is exhausted.
    pub async fn next(&mut self) -> bool {
        if self.attempts == 0 {
            self.attempts = 1;
            return true;
        }

        if self.attempts >= self.policy.max_attempts || self.deadline_passed() {
            return false;
        }

        let delay = self.policy.delay_after(self.attempts);
        match self.remaining() {
            Some(remaining) if delay >= remaining => {
                tokio::time::sleep(remaining).await;
                return false;
            }
            _ => tokio::time::sleep(delay).await,
        }

        self.attempts += 1;
        true
    }

    /// Attempts granted so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, if the policy has one
    pub fn remaining(&self) -> Option<Duration> {
        self.policy
            .deadline
            .map(|deadline| deadline.saturating_sub(self.started.elapsed()))
    }

    fn deadline_passed(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }
}

/// Error returned once a retried operation gives up
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails permanently, or the policy is exhausted
///
/// Only errors for which `is_transient` returns true are retried.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut schedule = policy.start();
    schedule.next().await;

    loop {
        match op().await {
            Ok(value) => {
                if schedule.attempts() > 1 {
                    debug!("{} succeeded after {} attempt(s)", what, schedule.attempts());
                }
                return Ok(value);
            }
            Err(error) if is_transient(&error) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    what,
                    schedule.attempts(),
                    policy.max_attempts,
                    error
                );
                if !schedule.next().await {
                    return Err(Exhausted {
                        error,
                        attempts: schedule.attempts(),
                    });
                }
            }
            Err(error) => {
                return Err(Exhausted {
                    error,
                    attempts: schedule.attempts(),
                });
            }
        }
    }
}
