use super::{record, single, Depth};
use crate::aggregate::aggregate;
use crate::error::{CarenetError, Result};
use crate::model::{Department, DepartmentId, DepartmentView, EntityKey, HospitalId, ParentKey, Patient};
use crate::observability::AggregationMetrics;
use crate::resilience::GuardedLookup;
use crate::storage::Repository;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Composite reads anchored on departments.
pub struct DepartmentAssembler {
    departments: Arc<dyn Repository<Department>>,
    patients: GuardedLookup<DepartmentId, Patient>,
    metrics: Option<AggregationMetrics>,
}

impl DepartmentAssembler {
    pub fn new(
        departments: Arc<dyn Repository<Department>>,
        patients: GuardedLookup<DepartmentId, Patient>,
    ) -> Self {
        Self {
            departments,
            patients,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AggregationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn departments(&self) -> &Arc<dyn Repository<Department>> {
        &self.departments
    }

    pub async fn with_patients(&self, id: i64) -> Result<DepartmentView> {
        let span = tracing::info_span!(
            "composite",
            request_id = %Uuid::new_v4(),
            root = "department",
            id
        );

        let result = self.load_with_patients(id).instrument(span).await;
        record(self.metrics.as_ref(), "department", &result);
        result
    }

    /// Departments only have one level of children below them.
    pub async fn with_children(&self, id: i64, depth: Depth) -> Result<DepartmentView> {
        match depth {
            Depth::One => self.with_patients(id).await,
            Depth::Two => Err(CarenetError::InvalidInput(
                "departments have one level of children; depth must be 1".to_string(),
            )),
        }
    }

    /// All departments of a hospital, each with its patients. A hospital
    /// without departments yields an empty list.
    pub async fn by_hospital_with_patients(&self, hospital_id: i64) -> Result<Vec<DepartmentView>> {
        let span = tracing::info_span!(
            "composite",
            request_id = %Uuid::new_v4(),
            root = "departments-by-hospital",
            hospital_id
        );

        let result = self.load_by_hospital(hospital_id).instrument(span).await;
        record(self.metrics.as_ref(), "department", &result);
        result
    }

    async fn load_with_patients(&self, id: i64) -> Result<DepartmentView> {
        let key = DepartmentId::parse(id)?;
        let department = self
            .departments
            .find_by_key(key)
            .await?
            .ok_or_else(|| CarenetError::not_found("department", key))?;
        let attached = single(aggregate(vec![department], &self.patients).await)?;
        Ok(DepartmentView::from(attached))
    }

    async fn load_by_hospital(&self, hospital_id: i64) -> Result<Vec<DepartmentView>> {
        let hospital = HospitalId::parse(hospital_id)?;
        let roots = self
            .departments
            .find_by_parent(ParentKey::Hospital(hospital))
            .await?;
        let attached = aggregate(roots, &self.patients).await;
        Ok(attached.into_iter().map(DepartmentView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RemoteLookup, RepositoryLookup};
    use crate::model::PatientId;
    use crate::resilience::{BreakerConfig, CircuitBreaker, ResilientCaller};
    use crate::storage::MemoryRepository;
    use std::time::Duration;

    fn assembler() -> DepartmentAssembler {
        let departments: Arc<dyn Repository<Department>> = Arc::new(MemoryRepository::with_entities(vec![
            Department {
                department_id: DepartmentId(101),
                name: "Cardiology".to_string(),
                hospital_id: HospitalId(7),
            },
            Department {
                department_id: DepartmentId(102),
                name: "Radiology".to_string(),
                hospital_id: HospitalId(7),
            },
        ]));
        let patients: Arc<dyn Repository<Patient>> = Arc::new(MemoryRepository::with_entities(vec![
            Patient {
                patient_id: PatientId(1),
                name: "P1".to_string(),
                department_id: DepartmentId(102),
                hospital_id: HospitalId(7),
            },
        ]));
        let lookup: Arc<dyn RemoteLookup<Parent = DepartmentId, Child = Patient>> =
            Arc::new(RepositoryLookup::<DepartmentId, Patient>::new("patient-service", patients));
        let breaker = CircuitBreaker::new("patient-service", BreakerConfig::default());
        DepartmentAssembler::new(
            departments,
            GuardedLookup::new(lookup, ResilientCaller::new(breaker), Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_by_hospital_with_patients() {
        let views = assembler().by_hospital_with_patients(7).await.unwrap();
        let ids: Vec<i64> = views.iter().map(|v| v.department.department_id.0).collect();
        assert_eq!(ids, vec![101, 102]);
        assert_eq!(views[0].patient_list, Some(Vec::new()));
        assert_eq!(views[1].patient_list.as_ref().unwrap().len(), 1);

        assert!(assembler().by_hospital_with_patients(9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_with_children_depth() {
        let assembler = assembler();
        let view = assembler.with_children(102, Depth::One).await.unwrap();
        assert_eq!(view.patient_list.unwrap().len(), 1);

        assert!(matches!(
            assembler.with_children(102, Depth::Two).await,
            Err(CarenetError::InvalidInput(_))
        ));
        assert!(matches!(
            assembler.with_patients(555).await,
            Err(CarenetError::RootNotFound { .. })
        ));
    }
}
