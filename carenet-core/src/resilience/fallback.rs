//! Calls that degrade to a fallback value instead of failing.

use super::circuit_breaker::CircuitBreaker;
use super::retry::{retry_with_policy, ExponentialBackoffRetry, RetryPolicy};
use crate::client::RemoteLookup;
use crate::error::{CarenetError, Result};
use crate::model::{Entity, EntityKey};
use crate::observability::AggregationMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Unavailable,
    TimedOut,
    ShortCircuited,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Unavailable => "unavailable",
            CallOutcome::TimedOut => "timeout",
            CallOutcome::ShortCircuited => "short_circuit",
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, CallOutcome::Success)
    }
}

/// Either the real result or the declared fallback, plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone)]
pub struct ResilientCaller {
    breaker: CircuitBreaker,
    retry: Arc<dyn RetryPolicy>,
    metrics: Option<AggregationMetrics>,
}

impl ResilientCaller {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            retry: Arc::new(ExponentialBackoffRetry::none()),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: AggregationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `lookup_fn` under the breaker, bounded by `timeout` (retries
    /// included), and substitutes `fallback` on any failure. Never errors.
    pub async fn call_with_fallback<T, F, Fut>(
        &self,
        lookup_fn: F,
        fallback: T,
        timeout: Duration,
    ) -> Resolved<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (resolved, elapsed) = self.execute(lookup_fn, fallback, timeout).await;
        self.record(resolved.outcome.as_str(), elapsed);
        resolved
    }

    async fn execute<T, F, Fut>(
        &self,
        mut lookup_fn: F,
        fallback: T,
        timeout: Duration,
    ) -> (Resolved<T>, Duration)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let dependency = self.breaker.name();

        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                crate::log_dependency!(debug, dependency, "circuit open, using fallback");
                let resolved = Resolved {
                    value: fallback,
                    outcome: CallOutcome::ShortCircuited,
                };
                return (resolved, started.elapsed());
            }
        };

        // The half-open probe is exactly one network attempt.
        let single_attempt = permit.is_trial();
        let retry = self.retry.as_ref();
        let attempt = async move {
            if single_attempt {
                lookup_fn().await
            } else {
                retry_with_policy(retry, lookup_fn).await
            }
        };

        // Dropping the attempt on timeout cancels the in-flight request, so a
        // late answer can never be merged.
        let resolved = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(value)) => {
                permit.succeed();
                Resolved {
                    value,
                    outcome: CallOutcome::Success,
                }
            }
            Ok(Err(e)) => {
                permit.fail();
                crate::log_dependency!(warn, dependency, error = %e, "call failed, using fallback");
                let outcome = match e {
                    CarenetError::DependencyTimeout { .. } => CallOutcome::TimedOut,
                    _ => CallOutcome::Unavailable,
                };
                Resolved {
                    value: fallback,
                    outcome,
                }
            }
            Err(_) => {
                permit.fail();
                crate::log_dependency!(
                    warn,
                    dependency,
                    timeout_ms = timeout.as_millis() as u64,
                    "call timed out, using fallback"
                );
                Resolved {
                    value: fallback,
                    outcome: CallOutcome::TimedOut,
                }
            }
        };

        (resolved, started.elapsed())
    }

    fn record(&self, outcome: &str, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_call(self.breaker.name(), outcome, elapsed);
        }
    }
}

/// A child lookup bound to its breaker, retry policy and timeout.
pub struct GuardedLookup<P, C> {
    lookup: Arc<dyn RemoteLookup<Parent = P, Child = C>>,
    caller: ResilientCaller,
    timeout: Duration,
}

impl<P, C> GuardedLookup<P, C>
where
    P: EntityKey,
    C: Entity,
{
    pub fn new(
        lookup: Arc<dyn RemoteLookup<Parent = P, Child = C>>,
        caller: ResilientCaller,
        timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            caller,
            timeout,
        }
    }

    pub fn dependency(&self) -> &str {
        self.lookup.dependency()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        self.caller.breaker()
    }

    /// Children of `parent`, or an empty collection when the dependency is
    /// unavailable, slow, or short-circuited.
    pub async fn children_or_empty(&self, parent: P) -> Resolved<Vec<C>> {
        let lookup = &self.lookup;
        let (resolved, elapsed) = self
            .caller
            .execute(|| lookup.fetch_children(parent), Vec::new(), self.timeout)
            .await;

        let label = match resolved.outcome {
            CallOutcome::Success if resolved.value.is_empty() => "empty",
            outcome => outcome.as_str(),
        };
        self.caller.record(label, elapsed);
        resolved
    }
}
