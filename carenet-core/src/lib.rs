pub mod aggregate;
pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod service;
pub mod storage;

pub use composer::{DepartmentAssembler, Depth, HospitalAssembler};
pub use config::{Config, ServiceRole};
pub use error::{CarenetError, Result};
pub use resilience::{CircuitBreaker, GuardedLookup, ResilientCaller};
pub use service::CarenetService;
