//! Circuit breaker protecting every external call.
//!
//! State machine: closed → open → half-open → closed. In the closed state a
//! ring buffer of the last N call outcomes drives three independent open
//! triggers: consecutive failures, windowed failure rate, and windowed
//! slow-call rate. The open state rejects immediately until the probe
//! deadline, then half-open admits a bounded number of probes; one probe
//! success closes the circuit, one failure re-opens it.
//!
//! Transitions run under a single mutex; observability counters are atomics
//! published through the process-wide metrics registry.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::Metrics;

/// Breaker tuning. The per-service presets live with the adapters.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Name used in errors, logs, and metric labels.
    pub name: &'static str,
    /// Per-call timeout; deadline exceedance counts as failure.
    pub call_timeout: Duration,
    /// How long the open state lasts before the first probe.
    pub open_for: Duration,
    /// Consecutive-failure open trigger.
    pub max_consecutive_failures: u32,
    /// Ring buffer size for the rate triggers.
    pub window_size: usize,
    /// Failure-rate open trigger over a full window, in [0, 1].
    pub failure_rate_threshold: f64,
    /// Calls slower than this are classified slow (they still succeed).
    pub slow_call_threshold: Duration,
    /// Slow-call-rate open trigger over a full window, in [0, 1].
    pub slow_rate_threshold: f64,
    /// Probe budget while half-open.
    pub half_open_max_in_flight: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "default",
            call_timeout: Duration::from_secs(10),
            open_for: Duration::from_secs(30),
            max_consecutive_failures: 5,
            window_size: 20,
            failure_rate_threshold: 0.5,
            slow_call_threshold: Duration::from_secs(5),
            slow_rate_threshold: 0.8,
            half_open_max_in_flight: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn gauge_value(self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

/// Error surface of a protected call.
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error> {
    /// Rejected without dialing the service.
    #[error("circuit `{name}` is open")]
    Open { name: &'static str },

    #[error("circuit `{name}` call timed out after {timeout:?}")]
    Timeout {
        name: &'static str,
        timeout: Duration,
    },

    #[error(transparent)]
    Service(E),
}

#[derive(Debug, Clone, Copy)]
struct CallOutcome {
    failed: bool,
    slow: bool,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    window: VecDeque<CallOutcome>,
    consecutive_failures: u32,
    /// Probe deadline while open.
    next_probe: Instant,
    half_open_in_flight: u32,
}

enum Permit {
    Normal,
    Probe,
}

/// Generic async circuit breaker.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    metrics: Option<Metrics>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                window: VecDeque::with_capacity(config.window_size),
                consecutive_failures: 0,
                next_probe: Instant::now(),
                half_open_in_flight: 0,
            }),
            config,
            metrics: None,
        }
    }

    /// Attach the process-wide metrics registry. Counters are labeled with
    /// the breaker name.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        metrics.breaker_state(self.config.name, BreakerState::Closed.gauge_value());
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex").state
    }

    /// Run `op` under the breaker with the configured per-call timeout.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        E: std::error::Error,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let permit = match self.acquire() {
            Ok(permit) => permit,
            Err(rejected) => {
                self.count("rejected");
                return Err(rejected);
            }
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.config.call_timeout, op()).await;
        let elapsed = started.elapsed();
        if let Some(m) = &self.metrics {
            m.breaker_call_seconds(self.config.name, elapsed.as_secs_f64());
        }
        let slow = elapsed >= self.config.slow_call_threshold;
        if slow {
            self.count("slow");
        }

        match result {
            Ok(Ok(value)) => {
                self.record(&permit, CallOutcome { failed: false, slow });
                self.count("success");
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record(&permit, CallOutcome { failed: true, slow });
                self.count("failure");
                Err(BreakerError::Service(err))
            }
            Err(_) => {
                self.record(&permit, CallOutcome { failed: true, slow: true });
                self.count("timeout");
                Err(BreakerError::Timeout {
                    name: self.config.name,
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    /// Like [`call`](Self::call), but a fallback may answer for any breaker
    /// error (open-state rejection included). A `Some` from the fallback
    /// converts the failure into success.
    pub async fn call_with_fallback<T, E, F, Fut, FB>(
        &self,
        op: F,
        fallback: FB,
    ) -> Result<T, BreakerError<E>>
    where
        E: std::error::Error,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        FB: FnOnce(&BreakerError<E>) -> Option<T>,
    {
        match self.call(op).await {
            Ok(value) => Ok(value),
            Err(err) => match fallback(&err) {
                Some(value) => {
                    debug!(breaker = self.config.name, cause = %err, "fallback answered");
                    Ok(value)
                }
                None => Err(err),
            },
        }
    }

    fn acquire<E: std::error::Error>(&self) -> Result<Permit, BreakerError<E>> {
        let mut inner = self.inner.lock().expect("breaker mutex");
        match inner.state {
            BreakerState::Closed => Ok(Permit::Normal),
            BreakerState::Open => {
                if Instant::now() >= inner.next_probe {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.half_open_in_flight = 1;
                    Ok(Permit::Probe)
                } else {
                    Err(BreakerError::Open {
                        name: self.config.name,
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_in_flight {
                    inner.half_open_in_flight += 1;
                    Ok(Permit::Probe)
                } else {
                    Err(BreakerError::Open {
                        name: self.config.name,
                    })
                }
            }
        }
    }

    fn record(&self, permit: &Permit, outcome: CallOutcome) {
        let mut inner = self.inner.lock().expect("breaker mutex");

        if let Permit::Probe = permit {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            // A probe result decides the circuit even if the state moved
            // while the probe was in flight.
            if outcome.failed {
                inner.next_probe = Instant::now() + self.config.open_for;
                self.transition(&mut inner, BreakerState::Open);
            } else if inner.state == BreakerState::HalfOpen {
                inner.window.clear();
                inner.consecutive_failures = 0;
                self.transition(&mut inner, BreakerState::Closed);
            }
            return;
        }

        if inner.window.len() == self.config.window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(outcome);
        if outcome.failed {
            inner.consecutive_failures += 1;
        } else {
            inner.consecutive_failures = 0;
        }

        if inner.state == BreakerState::Closed && self.should_open(&inner) {
            inner.next_probe = Instant::now() + self.config.open_for;
            self.transition(&mut inner, BreakerState::Open);
        }
    }

    fn should_open(&self, inner: &Inner) -> bool {
        if inner.consecutive_failures >= self.config.max_consecutive_failures {
            return true;
        }
        // Rate triggers only fire over a full window.
        if inner.window.len() < self.config.window_size {
            return false;
        }
        let len = inner.window.len() as f64;
        let failures = inner.window.iter().filter(|o| o.failed).count() as f64;
        let slow = inner.window.iter().filter(|o| o.slow).count() as f64;
        failures / len >= self.config.failure_rate_threshold
            || slow / len >= self.config.slow_rate_threshold
    }

    fn transition(&self, inner: &mut Inner, next: BreakerState) {
        if inner.state == next {
            return;
        }
        warn!(
            breaker = self.config.name,
            from = ?inner.state,
            to = ?next,
            "circuit breaker transition"
        );
        match next {
            BreakerState::Open => self.count("opened"),
            BreakerState::HalfOpen => self.count("half_open"),
            BreakerState::Closed => self.count("closed"),
        }
        inner.state = next;
        if let Some(m) = &self.metrics {
            m.breaker_state(self.config.name, next.gauge_value());
        }
    }

    fn count(&self, event: &str) {
        if let Some(m) = &self.metrics {
            m.breaker_event(self.config.name, event);
        }
    }
}
