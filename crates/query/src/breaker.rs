//! Per-peer circuit breaker.
//!
//! Closed: calls go through and failures inside `window` are counted.
//! Reaching `failure_threshold` opens the circuit, and calls are rejected
//! without touching the network until `cooldown` has elapsed. The circuit
//! then runs half-open: at most `half_open_requests` probe calls are in
//! flight at once, that many successes close the circuit and any failed
//! probe reopens it. Other calls are rejected while half-open.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::PeerError;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub window: Duration,
    pub cooldown: Duration,
    pub half_open_requests: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            half_open_requests: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_successes: usize,
}

impl Inner {
    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        while let Some(&at) = self.failures.front() {
            if now.duration_since(at) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// A half-open probe slot, released when the call finishes or is dropped.
struct ProbeSlot<'a>(&'a AtomicUsize);

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    probes_in_flight: AtomicUsize,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                half_open_successes: 0,
            }),
            probes_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    /// Runs `f` unless the circuit is open.
    ///
    /// Only errors for which [`PeerError::trips_breaker`] holds count as
    /// failures.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, PeerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PeerError>>,
    {
        let probe = self.admit().await?;
        let is_probe = probe.is_some();

        let result = f().await;
        match &result {
            Err(err) if err.trips_breaker() => self.on_failure(is_probe).await,
            _ => self.on_success(is_probe).await,
        }
        drop(probe);
        result
    }

    /// Admits a call. A call admitted while half-open holds a probe slot.
    async fn admit(&self) -> Result<Option<ProbeSlot<'_>>, PeerError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => {
                inner.prune(self.config.window);
                return Ok(None);
            }
            BreakerState::HalfOpen => {}
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                if !cooled {
                    return Err(PeerError::CircuitOpen(self.name.clone()));
                }
                tracing::info!(breaker = %self.name, "circuit half-open");
                inner.state = BreakerState::HalfOpen;
                inner.half_open_successes = 0;
            }
        }

        let in_flight = self.probes_in_flight.load(Ordering::Acquire);
        if in_flight + inner.half_open_successes >= self.config.half_open_requests {
            return Err(PeerError::CircuitOpen(self.name.clone()));
        }
        self.probes_in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(Some(ProbeSlot(&self.probes_in_flight)))
    }

    /// Outcomes of calls admitted before the circuit opened do not count
    /// while half-open.
    async fn on_success(&self, is_probe: bool) {
        let mut inner = self.inner.lock().await;
        if inner.state == BreakerState::HalfOpen && is_probe {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_requests {
                tracing::info!(breaker = %self.name, "circuit closed");
                inner.state = BreakerState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
            }
        }
    }

    async fn on_failure(&self, is_probe: bool) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::HalfOpen if !is_probe => {}
            BreakerState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "probe failed, circuit reopened");
                self.open(&mut inner);
            }
            BreakerState::Closed => {
                inner.failures.push_back(Instant::now());
                inner.prune(self.config.window);
                if inner.failures.len() >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failures.len(),
                        "circuit opened"
                    );
                    self.open(&mut inner);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.half_open_successes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: usize, cooldown: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            window: Duration::from_secs(60),
            cooldown,
            half_open_requests: 1,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), PeerError> {
        breaker
            .call(|| async { Err::<(), _>(PeerError::Transport("refused".into())) })
            .await
    }

    #[tokio::test]
    async fn passes_calls_through_while_closed() {
        let breaker = CircuitBreaker::new("member-service", config(3, Duration::from_secs(5)));
        let value = breaker.call(|| async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects() {
        let breaker = CircuitBreaker::new("member-service", config(3, Duration::from_secs(5)));
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        let mut called = false;
        let result = breaker
            .call(|| {
                called = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(PeerError::CircuitOpen(name)) if name == "member-service"));
        assert!(!called);
    }

    #[tokio::test]
    async fn client_errors_do_not_count() {
        let breaker = CircuitBreaker::new("book-service", config(1, Duration::from_secs(5)));
        let _ = breaker
            .call(|| async {
                Err::<(), _>(PeerError::Status {
                    service: "book-service".into(),
                    status: 404,
                })
            })
            .await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_a_successful_probe() {
        let breaker = CircuitBreaker::new("loan-service", config(1, Duration::from_millis(100)));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state().await, BreakerState::Open);

        tokio::time::advance(Duration::from_millis(150)).await;

        breaker.call(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new("loan-service", config(1, Duration::from_millis(100)));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert!(matches!(
            breaker.call(|| async { Ok(()) }).await,
            Err(PeerError::CircuitOpen(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_only_the_configured_trial_calls() {
        let breaker = CircuitBreaker::new("book-service", config(1, Duration::from_millis(100)));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = breaker.call(move || async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            Ok(())
        });
        let contender = async {
            started_rx.await.unwrap();
            let mut called = false;
            let result = breaker
                .call(|| {
                    called = true;
                    async { Ok(()) }
                })
                .await;
            release_tx.send(()).unwrap();
            (result, called)
        };

        let (probe_result, (contender_result, called)) = tokio::join!(probe, contender);
        probe_result.unwrap();
        assert!(matches!(contender_result, Err(PeerError::CircuitOpen(_))));
        assert!(!called);
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_call_frees_its_slot() {
        let breaker = CircuitBreaker::new("book-service", config(1, Duration::from_millis(100)));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| std::future::pending::<Result<(), PeerError>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        breaker.call(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }
}
