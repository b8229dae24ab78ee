use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Fixed-delay, fixed-ceiling status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Calls `check` until it yields a value or the attempt ceiling is hit.
    ///
    /// `check` receives the 1-based attempt number. Errors from `check` are
    /// returned immediately; only "not ready yet" (`Ok(None)`) is retried.
    pub async fn run<F, Fut, T>(&self, mut check: F) -> Result<PollOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for attempt in 1..=self.max_attempts {
            if let Some(value) = check(attempt).await? {
                return Ok(PollOutcome::Ready(value));
            }

            debug!(
                "Attempt {attempt}/{} not terminal, waiting {:?}",
                self.max_attempts, self.interval
            );

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Ok(PollOutcome::TimedOut {
            attempts: self.max_attempts,
        })
    }
}
