use crate::error::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus series for dependency calls, breaker state and composite requests.
#[derive(Clone)]
pub struct AggregationMetrics {
    registry: Arc<Registry>,
    dependency_calls: IntCounterVec,
    dependency_latency: HistogramVec,
    breaker_transitions: IntCounterVec,
    breaker_state: IntGaugeVec,
    composite_requests: IntCounterVec,
}

impl AggregationMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let dependency_calls = IntCounterVec::new(
            Opts::new("carenet_dependency_calls_total", "Dependency calls by outcome")
                .const_label("component", "aggregator"),
            &["dependency", "outcome"],
        )?;

        let dependency_latency = HistogramVec::new(
            HistogramOpts::new(
                "carenet_dependency_call_duration_seconds",
                "Time spent waiting on a dependency, fallbacks included",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["dependency"],
        )?;

        let breaker_transitions = IntCounterVec::new(
            Opts::new("carenet_breaker_transitions_total", "Circuit breaker state transitions"),
            &["dependency", "to"],
        )?;

        let breaker_state = IntGaugeVec::new(
            Opts::new(
                "carenet_breaker_state",
                "Circuit breaker state (0 closed, 1 open, 2 half-open)",
            ),
            &["dependency"],
        )?;

        let composite_requests = IntCounterVec::new(
            Opts::new("carenet_composite_requests_total", "Composite read requests"),
            &["root", "outcome"],
        )?;

        registry.register(Box::new(dependency_calls.clone()))?;
        registry.register(Box::new(dependency_latency.clone()))?;
        registry.register(Box::new(breaker_transitions.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;
        registry.register(Box::new(composite_requests.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            dependency_calls,
            dependency_latency,
            breaker_transitions,
            breaker_state,
            composite_requests,
        })
    }

    pub fn record_call(&self, dependency: &str, outcome: &str, elapsed: Duration) {
        self.dependency_calls
            .with_label_values(&[dependency, outcome])
            .inc();
        self.dependency_latency
            .with_label_values(&[dependency])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_transition(&self, dependency: &str, to: &str, state_code: i64) {
        self.breaker_transitions
            .with_label_values(&[dependency, to])
            .inc();
        self.breaker_state
            .with_label_values(&[dependency])
            .set(state_code);
    }

    pub fn record_composite(&self, root: &str, outcome: &str) {
        self.composite_requests
            .with_label_values(&[root, outcome])
            .inc();
    }

    pub fn calls(&self, dependency: &str, outcome: &str) -> u64 {
        self.dependency_calls
            .with_label_values(&[dependency, outcome])
            .get()
    }

    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::CarenetError::Unknown(format!("metrics are not UTF-8: {}", e)))
    }
}

impl std::fmt::Debug for AggregationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationMetrics").finish_non_exhaustive()
    }
}
