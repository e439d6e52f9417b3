//! Bounded retry with exponential backoff under a cancellable deadline

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_retry::Retry;
use tokio_util::sync::CancellationToken;

/// Why a retried operation did not produce a value
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("deadline expired after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

/// Attempt budget and backoff curve.
///
/// Delay before attempt `n + 1` is `base_delay * multiplier^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Sleeps between consecutive attempts (`max_attempts - 1` of them)
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        let multiplier = self.multiplier;
        (0..self.max_attempts.saturating_sub(1))
            .map(move |i| base.saturating_mul(multiplier.saturating_pow(i)))
    }

    /// Run `op` until it succeeds, the attempts run out, or the deadline fires.
    ///
    /// Expiry aborts whatever is in flight, including a pending backoff sleep.
    pub async fn run<T, E, F, Fut>(&self, deadline: &Deadline, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if deadline.is_expired() {
            return Err(RetryError::Cancelled { attempts: 0 });
        }

        let attempts = AtomicU32::new(0);
        let attempt_once = || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let fut = op();
            async move {
                let result = fut.await;
                if let Err(e) = &result {
                    tracing::debug!(attempt, error = %e, "Attempt failed");
                }
                result
            }
        };

        tokio::select! {
            result = Retry::spawn(self.delays(), attempt_once) => {
                result.map_err(|last| RetryError::Exhausted { attempts: attempts.load(Ordering::Relaxed), last })
            }
            _ = deadline.expired() => Err(RetryError::Cancelled { attempts: attempts.load(Ordering::Relaxed) }),
        }
    }
}

/// Overall time budget for one unit of work.
///
/// Expires when its instant passes or when the parent token is cancelled
/// (process shutdown).
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub fn after(duration: Duration, parent: &CancellationToken) -> Self {
        Self {
            at: Instant::now() + duration,
            token: parent.child_token(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.at
    }

    /// Resolves once the deadline has passed or was cancelled
    pub async fn expired(&self) {
        tokio::select! {
            _ = tokio::time::sleep_until(self.at) => {}
            _ = self.token.cancelled() => {}
        }
    }

    /// Run `fut` unless the deadline fires first
    pub async fn within<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            out = fut => Some(out),
            _ = self.expired() => None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}
