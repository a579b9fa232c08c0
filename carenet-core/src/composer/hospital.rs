use super::{record, single, Depth, Relation};
use crate::aggregate::{aggregate, aggregate_nested};
use crate::error::{CarenetError, Result};
use crate::model::{
    Department, DepartmentId, EntityKey, Hospital, HospitalId, HospitalView, Patient,
};
use crate::observability::AggregationMetrics;
use crate::resilience::GuardedLookup;
use crate::storage::Repository;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Composite reads anchored on a hospital.
pub struct HospitalAssembler {
    hospitals: Arc<dyn Repository<Hospital>>,
    departments: GuardedLookup<HospitalId, Department>,
    patients_by_department: GuardedLookup<DepartmentId, Patient>,
    patients_by_hospital: GuardedLookup<HospitalId, Patient>,
    metrics: Option<AggregationMetrics>,
}

impl HospitalAssembler {
    pub fn new(
        hospitals: Arc<dyn Repository<Hospital>>,
        departments: GuardedLookup<HospitalId, Department>,
        patients_by_department: GuardedLookup<DepartmentId, Patient>,
        patients_by_hospital: GuardedLookup<HospitalId, Patient>,
    ) -> Self {
        Self {
            hospitals,
            departments,
            patients_by_department,
            patients_by_hospital,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AggregationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn hospitals(&self) -> &Arc<dyn Repository<Hospital>> {
        &self.hospitals
    }

    /// Loads hospital `id` and attaches the requested relation. Only a bad or
    /// unknown key fails; dependency trouble yields empty collections.
    pub async fn assemble(&self, id: i64, relation: Relation) -> Result<HospitalView> {
        let span = tracing::info_span!(
            "composite",
            request_id = %Uuid::new_v4(),
            root = "hospital",
            id,
            relation = relation.as_str()
        );

        let result = self.assemble_inner(id, relation).instrument(span).await;
        record(self.metrics.as_ref(), "hospital", &result);
        result
    }

    async fn assemble_inner(&self, id: i64, relation: Relation) -> Result<HospitalView> {
        let key = HospitalId::parse(id)?;
        let hospital = self
            .hospitals
            .find_by_key(key)
            .await?
            .ok_or_else(|| CarenetError::not_found("hospital", key))?;

        let roots = vec![hospital];
        let view: HospitalView = match relation {
            Relation::Departments => single(aggregate(roots, &self.departments).await)?.into(),
            Relation::DepartmentsWithPatients => single(
                aggregate_nested(roots, &self.departments, &self.patients_by_department).await,
            )?
            .into(),
            Relation::Patients => single(aggregate(roots, &self.patients_by_hospital).await)?.into(),
        };

        tracing::info!("composite assembled");
        Ok(view)
    }

    pub async fn with_children(&self, id: i64, depth: Depth) -> Result<HospitalView> {
        self.assemble(id, Relation::from(depth)).await
    }

    pub async fn with_departments(&self, id: i64) -> Result<HospitalView> {
        self.assemble(id, Relation::Departments).await
    }

    pub async fn with_departments_and_patients(&self, id: i64) -> Result<HospitalView> {
        self.assemble(id, Relation::DepartmentsWithPatients).await
    }

    pub async fn with_patients(&self, id: i64) -> Result<HospitalView> {
        self.assemble(id, Relation::Patients).await
    }

    /// Every stored hospital with its departments, in key order.
    pub async fn list_with_departments(&self) -> Result<Vec<HospitalView>> {
        let hospitals = self.hospitals.find_all().await?;
        let attached = aggregate(hospitals, &self.departments).await;
        tracing::debug!(roots = attached.len(), "hospital list assembled");
        Ok(attached.into_iter().map(HospitalView::from).collect())
    }
}
