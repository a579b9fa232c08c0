pub mod retry;
pub mod circuit_breaker;
pub mod fallback;

pub use retry::{RetryPolicy, ExponentialBackoffRetry};
pub use circuit_breaker::{BreakerConfig, CallPermit, CircuitBreaker, CircuitState};
pub use fallback::{CallOutcome, GuardedLookup, ResilientCaller, Resolved};
