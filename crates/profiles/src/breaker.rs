//! Circuit breaker and the fault-isolating store decorator.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls are not attempted
//! - HalfOpen: reset timeout elapsed, calls probe the backend
//!
//! ```text
//! Closed   → Open:     failure_threshold consecutive failures
//! Open     → HalfOpen: reset_timeout elapsed since the last failure
//! HalfOpen → Closed:   a call succeeds (failure count reset)
//! HalfOpen → Open:     a call fails
//! ```
//!
//! The permission check and the guarded call run outside the lock, so under
//! heavy concurrency a few calls may overshoot the threshold.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{ProfileError, ProfileResult};
use crate::profile::{Profile, ProfileStats, ProfileUpdates};
use crate::store::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    /// Upper bound on each guarded call; exceeding it counts as a failure
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Shared failure-tracking state for one backend connection
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may proceed now. Moves Open → HalfOpen once the reset
    /// timeout has elapsed.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(state = "half_open", "Circuit breaker probing backend");
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(state = "closed", "Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let trip = inner.state == CircuitState::HalfOpen
            || (inner.state == CircuitState::Closed && inner.failures >= self.config.failure_threshold);
        if trip {
            inner.state = CircuitState::Open;
            tracing::warn!(
                state = "open",
                failures = inner.failures,
                reset_timeout_secs = self.config.reset_timeout.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.failures,
        }
    }
}

/// [`ProfileStore`] decorator that consults a [`CircuitBreaker`] before
/// every call.
///
/// While the breaker denies calls, reads degrade to a cache miss, stats to
/// an empty aggregate, and writes fail with [`ProfileError::CacheUnavailable`].
pub struct FaultIsolatedStore<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S: ProfileStore> FaultIsolatedStore<S> {
    pub fn new(inner: S, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn guarded<T, F>(&self, operation: &'static str, fut: F) -> ProfileResult<T>
    where
        F: Future<Output = ProfileResult<T>>,
    {
        match tokio::time::timeout(self.breaker.config.call_timeout, fut).await {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                if e.is_backend_failure() {
                    self.breaker.record_failure();
                }
                Err(e)
            }
            Err(_) => {
                self.breaker.record_failure();
                Err(ProfileError::Timeout { operation })
            }
        }
    }
}

#[async_trait]
impl<S: ProfileStore> ProfileStore for FaultIsolatedStore<S> {
    async fn store(&self, user_id: &str, profile: &Profile) -> ProfileResult<()> {
        if !self.breaker.try_acquire() {
            return Err(ProfileError::CacheUnavailable);
        }
        self.guarded("profile store", self.inner.store(user_id, profile))
            .await
    }

    async fn get(&self, user_id: &str) -> ProfileResult<Option<Profile>> {
        if !self.breaker.try_acquire() {
            tracing::debug!(user_id = %user_id, "Circuit open, treating profile read as miss");
            return Ok(None);
        }
        match self.guarded("profile get", self.inner.get(user_id)).await {
            Ok(profile) => Ok(profile),
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(user_id = %user_id, error = %e, "Profile read failed, treating as miss");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, user_id: &str, updates: &ProfileUpdates) -> ProfileResult<()> {
        if !self.breaker.try_acquire() {
            return Err(ProfileError::CacheUnavailable);
        }
        self.guarded("profile update", self.inner.update(user_id, updates))
            .await
    }

    async fn stats(&self) -> ProfileResult<ProfileStats> {
        if !self.breaker.try_acquire() {
            return Ok(ProfileStats::default());
        }
        match self.guarded("profile stats", self.inner.stats()).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Profile stats unavailable, returning empty aggregate");
                Ok(ProfileStats::default())
            }
        }
    }
}
