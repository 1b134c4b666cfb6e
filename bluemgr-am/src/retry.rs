//! Bounded retry policies and the sleep abstraction
//!
//! Every wait in the pairing workflow goes through a [`Sleeper`], so tests
//! can run the full workflow without real delays and assert on the delays
//! that would have been taken.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Source of delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A retry budget ran out without the success predicate holding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
}

/// Max attempts plus the delay between attempts
///
/// The delay after attempt `n` (1-based) is `delay * multiplier^(n-1)`,
/// capped at `max_delay` when set. A multiplier of 1.0 gives a fixed delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub multiplier: f64,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            multiplier: 1.0,
            max_delay: None,
        }
    }

    /// Delay grows by `multiplier` after each failed attempt
    pub fn backoff(max_attempts: u32, delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            multiplier,
            max_delay: Some(max_delay),
        }
    }

    /// Delay taken after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(0.0).powi(attempt.saturating_sub(1) as i32);
        let delay = Duration::from_nanos((self.delay.as_nanos() as f64 * factor).round() as u64);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `attempt` until it yields `Some`, at most `max_attempts` times
    ///
    /// The closure receives the 1-based attempt number. No delay follows the
    /// final attempt.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, mut attempt: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for n in 1..=self.max_attempts {
            if let Some(value) = attempt(n).await {
                return Ok(value);
            }
            if n < self.max_attempts {
                sleeper.sleep(self.delay_after(n)).await;
            }
        }

        Err(RetryExhausted {
            attempts: self.max_attempts,
        })
    }
}
