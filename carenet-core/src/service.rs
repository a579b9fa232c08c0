//! Wires one service role from its configuration: storage, dependency
//! lookups with their breakers, assemblers and the HTTP router.

use crate::client::{HttpLookup, RemoteLookup};
use crate::composer::{DepartmentAssembler, HospitalAssembler};
use crate::config::{Config, ServiceRole, DEPARTMENT_SERVICE, PATIENT_SERVICE};
use crate::error::{CarenetError, Result};
use crate::http::{
    crud_routes, department_routes, hospital_routes, ops_routes, patient_routes, OpsState,
};
use crate::model::{Department, Entity, EntityKey, Hospital, Patient};
use crate::observability::AggregationMetrics;
use crate::resilience::{
    BreakerConfig, CircuitBreaker, ExponentialBackoffRetry, GuardedLookup, ResilientCaller,
};
use crate::storage::{Database, MemoryRepository, Repository, SqliteRepository};
use axum::Router;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const DEPARTMENTS_BY_HOSPITAL: &str = "/departments/hospital/{id}";
pub const PATIENTS_BY_DEPARTMENT: &str = "/patients/department/{id}";
pub const PATIENTS_BY_HOSPITAL: &str = "/patients/hospital/{id}";

pub struct CarenetService {
    role: ServiceRole,
    ops: Arc<OpsState>,
    routes: Router,
}

impl CarenetService {
    pub async fn build(config: &Config) -> Result<Self> {
        let role = config.service.role;
        let metrics = AggregationMetrics::new()?;
        let database = match &config.storage.path {
            Some(path) => Some(Database::open(path).await?),
            None => None,
        };
        let mut wiring = Wiring::new(config, metrics.clone())?;

        let routes = match role {
            ServiceRole::Hospital => {
                let hospitals = open_repository::<Hospital>(database.as_ref()).await?;
                let assembler = HospitalAssembler::new(
                    hospitals.clone(),
                    wiring.lookup(DEPARTMENT_SERVICE, DEPARTMENTS_BY_HOSPITAL)?,
                    wiring.lookup(PATIENT_SERVICE, PATIENTS_BY_DEPARTMENT)?,
                    wiring.lookup(PATIENT_SERVICE, PATIENTS_BY_HOSPITAL)?,
                )
                .with_metrics(metrics.clone());

                crud_routes(hospitals).merge(hospital_routes(Arc::new(assembler)))
            }
            ServiceRole::Department => {
                let departments = open_repository::<Department>(database.as_ref()).await?;
                let assembler = DepartmentAssembler::new(
                    departments.clone(),
                    wiring.lookup(PATIENT_SERVICE, PATIENTS_BY_DEPARTMENT)?,
                )
                .with_metrics(metrics.clone());

                crud_routes(departments).merge(department_routes(Arc::new(assembler)))
            }
            ServiceRole::Patient => {
                let patients = open_repository::<Patient>(database.as_ref()).await?;
                crud_routes(patients.clone()).merge(patient_routes(patients))
            }
        };

        let breakers: Vec<CircuitBreaker> = wiring.breakers.into_values().collect();
        tracing::info!(
            role = %role,
            dependencies = breakers.len(),
            persistent = database.is_some(),
            "service wired"
        );

        Ok(Self {
            role,
            ops: Arc::new(OpsState {
                role,
                metrics,
                breakers,
            }),
            routes,
        })
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn metrics(&self) -> &AggregationMetrics {
        &self.ops.metrics
    }

    pub fn breaker(&self, dependency: &str) -> Option<&CircuitBreaker> {
        self.ops.breakers.iter().find(|b| b.name() == dependency)
    }

    pub fn router(&self) -> Router {
        self.routes
            .clone()
            .merge(ops_routes(self.ops.clone()))
            .layer(TraceLayer::new_for_http())
    }
}

async fn open_repository<E: Entity>(database: Option<&Database>) -> Result<Arc<dyn Repository<E>>> {
    Ok(match database {
        Some(db) => Arc::new(SqliteRepository::<E>::new(db).await?),
        None => Arc::new(MemoryRepository::<E>::new()),
    })
}

/// One breaker per dependency name, shared by every lookup against it.
struct Wiring<'a> {
    config: &'a Config,
    client: Client,
    metrics: AggregationMetrics,
    breakers: BTreeMap<String, CircuitBreaker>,
}

impl<'a> Wiring<'a> {
    fn new(config: &'a Config, metrics: AggregationMetrics) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("carenet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CarenetError::InvalidConfig(format!("http client: {}", e)))?;

        Ok(Self {
            config,
            client,
            metrics,
            breakers: BTreeMap::new(),
        })
    }

    fn lookup<P: EntityKey, C: Entity>(&mut self, name: &str, path: &str) -> Result<GuardedLookup<P, C>> {
        let dependency = self.config.dependency(name)?;
        let metrics = self.metrics.clone();
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                CircuitBreaker::new(name, BreakerConfig::from(&dependency.breaker)).with_metrics(metrics)
            })
            .clone();

        let caller = ResilientCaller::new(breaker)
            .with_retry(Arc::new(ExponentialBackoffRetry::with_retries(dependency.retries)))
            .with_metrics(self.metrics.clone());
        let http: Arc<dyn RemoteLookup<Parent = P, Child = C>> = Arc::new(HttpLookup::<P, C>::new(
            name,
            self.client.clone(),
            dependency.base_url.clone(),
            path,
            dependency.timeout(),
        ));

        Ok(GuardedLookup::new(http, caller, dependency.timeout()))
    }
}
