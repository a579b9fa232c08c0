pub mod logging;
pub mod metrics;

pub use logging::setup_logging;
pub use metrics::AggregationMetrics;
