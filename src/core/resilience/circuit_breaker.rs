//! Circuit breakers for per-dependency failure isolation
//!
//! A breaker has three states:
//! - **Closed**: calls pass through; outcomes are recorded in a rolling window
//! - **Open**: calls fail fast until the recovery timeout has elapsed since
//!   the last failure
//! - **Half-open**: probe calls pass through; enough successes close the
//!   circuit, any failure opens it again
//!
//! [`CircuitBreakerManager`] keeps one breaker per dependency name
//! (`document-export`, `file-write`, ...), created on first use.

use crate::config::CircuitBreakerSettings;
use crate::domain::{QuipError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing fast - requests are rejected immediately
    Open,
    /// Probing whether the dependency has recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is let through
    pub recovery_timeout: Duration,
    /// Half-open successes required to close the circuit
    pub success_threshold: u32,
    /// Length of the rolling window
    pub monitoring_window: Duration,
    /// Calls the window must hold before the failure threshold applies
    pub minimum_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            monitoring_window: Duration::from_secs(120),
            minimum_requests: 10,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_millis(settings.recovery_timeout_ms),
            success_threshold: settings.success_threshold,
            monitoring_window: Duration::from_millis(settings.monitoring_window_ms),
            minimum_requests: settings.minimum_requests,
        }
    }
}

/// Statistics for one breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    /// Dependency name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failures inside the rolling window
    pub failure_count: usize,
    /// Successes inside the rolling window
    pub success_count: usize,
    /// Successes since entering half-open
    pub half_open_successes: u32,
    /// Calls that reached the operation
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    /// Time of the last failure
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Time of the last success
    pub last_success_time: Option<DateTime<Utc>>,
    /// Time of the last state transition
    pub state_changed_at: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    window: VecDeque<(Instant, bool)>,
    half_open_successes: u32,
    total_calls: u64,
    rejected_calls: u64,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    state_changed_at: DateTime<Utc>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            half_open_successes: 0,
            total_calls: 0,
            rejected_calls: 0,
            last_failure: None,
            last_failure_time: None,
            last_success_time: None,
            state_changed_at: Utc::now(),
        }
    }

    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        while let Some((at, _)) = self.window.front() {
            if now.duration_since(*at) > window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures(&self) -> usize {
        self.window.iter().filter(|(_, ok)| !ok).count()
    }
}

/// Circuit breaker guarding one dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Dependency name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` through the breaker
    ///
    /// When the circuit is open and the recovery timeout hasn't elapsed, the
    /// operation is not invoked and [`QuipError::ServiceUnavailable`] is
    /// returned.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.before_call()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    fn before_call(&self) -> Result<()> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let probe_due = inner
                .last_failure
                .map(|at| at.elapsed() >= self.config.recovery_timeout)
                .unwrap_or(true);

            if !probe_due {
                inner.rejected_calls += 1;
                debug!(circuit = %self.name, "Circuit open, rejecting call");
                return Err(QuipError::ServiceUnavailable(self.name.clone()));
            }

            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        inner.total_calls += 1;
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.last_success_time = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                inner.window.push_back((Instant::now(), true));
                self.evaluate_window(&mut inner);
            }
            // a call admitted before another caller opened the circuit
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, error: &QuipError) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, error = %error, "Probe failed, reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed => {
                inner.window.push_back((Instant::now(), false));
                self.evaluate_window(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn evaluate_window(&self, inner: &mut BreakerState) {
        inner.prune(self.config.monitoring_window);

        let requests = inner.window.len();
        let failures = inner.failures();
        if requests >= self.config.minimum_requests as usize
            && failures >= self.config.failure_threshold as usize
        {
            warn!(
                circuit = %self.name,
                failures,
                requests,
                "Failure threshold reached, opening circuit"
            );
            self.transition(inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state == to {
            return;
        }

        info!(circuit = %self.name, from = %inner.state, to = %to, "Circuit state change");
        inner.state = to;
        inner.state_changed_at = Utc::now();
        inner.half_open_successes = 0;
        if to == CircuitState::Closed {
            inner.window.clear();
        }
    }

    /// Force the breaker closed and clear its counters
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = BreakerState::new();
        debug!(circuit = %self.name, "Circuit breaker reset");
    }

    /// Current statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock();
        inner.prune(self.config.monitoring_window);
        let failure_count = inner.failures();

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count,
            success_count: inner.window.len() - failure_count,
            half_open_successes: inner.half_open_successes,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            state_changed_at: inner.state_changed_at,
        }
    }
}

/// Registry of circuit breakers keyed by dependency name
pub struct CircuitBreakerManager {
    default_config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    /// Create a manager whose breakers inherit `default_config`
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it on first use
    ///
    /// `config` only applies when the breaker is created.
    pub async fn get_or_create(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(circuit = name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    name,
                    config.unwrap_or_else(|| self.default_config.clone()),
                ))
            })
            .clone()
    }

    /// Run `operation` through the breaker named `name`
    pub async fn execute<F, Fut, T>(&self, name: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = self.get_or_create(name, None).await;
        breaker.execute(operation).await
    }

    /// Statistics for every known breaker, sorted by name
    pub async fn get_all_stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers = self.breakers.read().await;
        let mut stats: Vec<_> = breakers.values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Names of breakers currently open
    pub async fn get_open_circuits(&self) -> Vec<String> {
        let breakers = self.breakers.read().await;
        let mut open: Vec<String> = breakers
            .values()
            .filter(|b| b.state() == CircuitState::Open)
            .map(|b| b.name().to_string())
            .collect();
        open.sort();
        open
    }

    /// Reset one breaker; returns false if it doesn't exist
    pub async fn reset(&self, name: &str) -> bool {
        match self.breakers.read().await.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker
    pub async fn reset_all(&self) {
        for breaker in self.breakers.read().await.values() {
            breaker.reset();
        }
        info!("All circuit breakers reset");
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
