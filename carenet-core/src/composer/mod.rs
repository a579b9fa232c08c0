pub mod department;
pub mod hospital;

pub use department::DepartmentAssembler;
pub use hospital::HospitalAssembler;

use crate::error::{CarenetError, Result};
use crate::observability::AggregationMetrics;

/// How many levels of children a composite read asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for Depth {
    type Error = CarenetError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Depth::One),
            2 => Ok(Depth::Two),
            other => Err(CarenetError::InvalidInput(format!(
                "depth must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl Depth {
    pub fn from_query(depth: Option<u8>) -> Result<Self> {
        depth.map_or(Ok(Depth::One), Depth::try_from)
    }
}

/// Child relations a hospital read can be composed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Departments,
    DepartmentsWithPatients,
    Patients,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Departments => "departments",
            Relation::DepartmentsWithPatients => "departments+patients",
            Relation::Patients => "patients",
        }
    }
}

impl From<Depth> for Relation {
    fn from(depth: Depth) -> Self {
        match depth {
            Depth::One => Relation::Departments,
            Depth::Two => Relation::DepartmentsWithPatients,
        }
    }
}

fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CarenetError::RootNotFound { .. }) => "not_found",
        Err(CarenetError::InvalidInput(_)) => "invalid",
        Err(_) => "error",
    }
}

fn record<T>(metrics: Option<&AggregationMetrics>, root: &str, result: &Result<T>) {
    if let Some(metrics) = metrics {
        metrics.record_composite(root, outcome_label(result));
    }
}

fn single<T>(mut items: Vec<T>) -> Result<T> {
    items
        .pop()
        .ok_or_else(|| CarenetError::Unknown("aggregation returned no root".to_string()))
}
