use crate::config::ServiceRole;
use crate::error::Result;
use crate::observability::AggregationMetrics;
use crate::resilience::{CircuitBreaker, CircuitState};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct OpsState {
    pub role: ServiceRole,
    pub metrics: AggregationMetrics,
    pub breakers: Vec<CircuitBreaker>,
}

pub fn ops_routes(state: Arc<OpsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Always 200: an open breaker degrades composites but the service still answers.
async fn health(State(state): State<Arc<OpsState>>) -> Json<Value> {
    let mut dependencies = Map::new();
    let mut degraded = false;
    for breaker in &state.breakers {
        let breaker_state = breaker.state();
        degraded |= breaker_state != CircuitState::Closed;
        dependencies.insert(
            breaker.name().to_string(),
            Value::String(breaker_state.as_str().to_string()),
        );
    }

    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "role": state.role.to_string(),
        "dependencies": dependencies,
    }))
}

async fn metrics(State(state): State<Arc<OpsState>>) -> Result<impl IntoResponse> {
    let body = state.metrics.export()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
