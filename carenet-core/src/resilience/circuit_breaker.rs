use crate::error::{CarenetError, Result};
use crate::observability::AggregationMetrics;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

    fn code(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures inside `failure_window` that open the circuit.
    pub failure_threshold: u32,
    pub failure_window: Duration,
    /// How long the circuit stays open before a trial call is let through.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            trial_in_flight: false,
        }
    }

    fn move_to(&mut self, to: CircuitState, now: Instant) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        match to {
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.failures.clear();
                self.trial_in_flight = false;
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.failures.clear();
                self.trial_in_flight = false;
            }
            CircuitState::HalfOpen => {}
        }
        Some(Transition { from, to })
    }

    /// Returns whether the call may go ahead and whether it is the half-open trial.
    fn admit(&mut self, config: &BreakerConfig, now: Instant) -> (Option<bool>, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (Some(false), None),
            CircuitState::Open => {
                let cooled_down = self
                    .opened_at
                    .map_or(true, |opened| now.duration_since(opened) >= config.cooldown);
                if cooled_down {
                    let transition = self.move_to(CircuitState::HalfOpen, now);
                    self.trial_in_flight = true;
                    (Some(true), transition)
                } else {
                    (None, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    (None, None)
                } else {
                    self.trial_in_flight = true;
                    (Some(true), None)
                }
            }
        }
    }

    /// Only the trial settles a half-open circuit. Calls admitted before the
    /// circuit opened may finish late and are ignored once it has left `Closed`.
    fn on_success(&mut self, trial: bool, now: Instant) -> Option<Transition> {
        match self.state {
            CircuitState::HalfOpen if trial => self.move_to(CircuitState::Closed, now),
            CircuitState::HalfOpen => None,
            CircuitState::Closed => {
                self.failures.clear();
                None
            }
            CircuitState::Open => None,
        }
    }

    fn on_failure(&mut self, trial: bool, config: &BreakerConfig, now: Instant) -> Option<Transition> {
        match self.state {
            CircuitState::HalfOpen if trial => self.move_to(CircuitState::Open, now),
            CircuitState::HalfOpen => None,
            CircuitState::Closed => {
                self.failures.push_back(now);
                while let Some(oldest) = self.failures.front() {
                    if now.duration_since(*oldest) > config.failure_window {
                        self.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if self.failures.len() as u32 >= config.failure_threshold {
                    self.move_to(CircuitState::Open, now)
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }
}

/// Per-dependency breaker shared by every caller of that dependency.
///
/// The state is mirrored into an atomic so readers never take the lock; the
/// lock itself only guards short bookkeeping and is never held across an await.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: BreakerConfig,
    state: Arc<AtomicU8>,
    inner: Arc<Mutex<CircuitBreakerInner>>,
    metrics: Option<AggregationMetrics>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            config,
            state: Arc::new(AtomicU8::new(CircuitState::Closed.code())),
            inner: Arc::new(Mutex::new(CircuitBreakerInner::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AggregationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_code(self.state.load(Ordering::Acquire))
    }

    /// Asks to place one call. Fails fast with `CircuitOpen` while the circuit
    /// is open or while the single half-open trial is still in flight.
    pub fn try_acquire(&self) -> Result<CallPermit> {
        if self.state() == CircuitState::Closed {
            return Ok(CallPermit::new(self.clone(), false));
        }

        let (admitted, transition) = {
            let mut inner = self.inner.lock();
            let decision = inner.admit(&self.config, Instant::now());
            self.state.store(inner.state.code(), Ordering::Release);
            decision
        };
        self.report(transition);

        match admitted {
            Some(trial) => Ok(CallPermit::new(self.clone(), trial)),
            None => Err(CarenetError::CircuitOpen(self.name.to_string())),
        }
    }

    fn on_success(&self, trial: bool) {
        let transition = {
            let mut inner = self.inner.lock();
            let transition = inner.on_success(trial, Instant::now());
            self.state.store(inner.state.code(), Ordering::Release);
            transition
        };
        self.report(transition);
    }

    fn on_failure(&self, trial: bool) {
        let transition = {
            let mut inner = self.inner.lock();
            let transition = inner.on_failure(trial, &self.config, Instant::now());
            self.state.store(inner.state.code(), Ordering::Release);
            transition
        };
        self.report(transition);
    }

    fn report(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        match transition.to {
            CircuitState::Open => crate::log_dependency!(
                warn,
                &*self.name,
                from = transition.from.as_str(),
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "circuit opened"
            ),
            CircuitState::HalfOpen => crate::log_dependency!(
                info,
                &*self.name,
                "circuit half-open, letting one trial call through"
            ),
            CircuitState::Closed => crate::log_dependency!(info, &*self.name, "circuit closed"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(&self.name, transition.to.as_str(), transition.to.code() as i64);
        }
    }
}

/// Admission for one call. Settle it with `succeed` or `fail`; a trial permit
/// dropped unsettled (the call was cancelled) counts as a failed trial.
#[must_use]
pub struct CallPermit {
    breaker: CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    fn new(breaker: CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.on_failure(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "patient-service",
            BreakerConfig {
                failure_threshold: threshold,
                failure_window: Duration::from_secs(10),
                cooldown: Duration::from_secs(5),
            },
        )
    }

    fn fail_once(breaker: &CircuitBreaker) {
        breaker.try_acquire().unwrap().fail();
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_consecutive_failures() {
        let breaker = breaker(3);
        fail_once(&breaker);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(breaker.try_acquire(), Err(CarenetError::CircuitOpen(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_tally() {
        let breaker = breaker(3);
        fail_once(&breaker);
        fail_once(&breaker);
        breaker.try_acquire().unwrap().succeed();
        fail_once(&breaker);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_are_forgotten() {
        let breaker = breaker(3);
        fail_once(&breaker);
        fail_once(&breaker);
        tokio::time::advance(Duration::from_secs(11)).await;
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_cooldown() {
        let breaker = breaker(1);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Only one trial at a time.
        assert!(breaker.try_acquire().is_err());

        trial.succeed();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!breaker.try_acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_call_cannot_settle_half_open() {
        let breaker = breaker(1);
        let late_success = breaker.try_acquire().unwrap();
        let late_failure = breaker.try_acquire().unwrap();
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());

        late_success.succeed();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err());

        late_failure.fail();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err());

        trial.succeed();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_with_fresh_cooldown() {
        let breaker = breaker(1);
        fail_once(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;

        breaker.try_acquire().unwrap().fail();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(breaker.try_acquire().is_err());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(breaker.try_acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_counts_as_failure() {
        let breaker = breaker(1);
        fail_once(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_are_recorded() {
        let metrics = AggregationMetrics::new().unwrap();
        let breaker = breaker(1).with_metrics(metrics.clone());
        fail_once(&breaker);
        let text = metrics.export().unwrap();
        assert!(text.contains("to=\"open\""));
    }
}
