//! Relationship and composite read routes, one set per service role.

use crate::composer::{DepartmentAssembler, Depth, HospitalAssembler};
use crate::error::Result;
use crate::model::{
    Department, DepartmentId, DepartmentView, EntityKey, HospitalId, HospitalView, ParentKey,
    Patient,
};
use crate::storage::Repository;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<u8>,
}

pub fn hospital_routes(assembler: Arc<HospitalAssembler>) -> Router {
    Router::new()
        .route("/hospitals/with-departments", get(hospitals_with_departments))
        .route("/hospitals/:id/with-children", get(hospital_with_children))
        .route("/hospitals/:id/with-departments", get(hospital_with_departments))
        .route(
            "/hospitals/:id/with-departments-and-patients",
            get(hospital_with_departments_and_patients),
        )
        .route("/hospitals/:id/with-patients", get(hospital_with_patients))
        .with_state(assembler)
}

async fn hospitals_with_departments(
    State(assembler): State<Arc<HospitalAssembler>>,
) -> Result<Json<Vec<HospitalView>>> {
    Ok(Json(assembler.list_with_departments().await?))
}

async fn hospital_with_children(
    State(assembler): State<Arc<HospitalAssembler>>,
    Path(id): Path<i64>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<HospitalView>> {
    let depth = Depth::from_query(query.depth)?;
    Ok(Json(assembler.with_children(id, depth).await?))
}

async fn hospital_with_departments(
    State(assembler): State<Arc<HospitalAssembler>>,
    Path(id): Path<i64>,
) -> Result<Json<HospitalView>> {
    Ok(Json(assembler.with_departments(id).await?))
}

async fn hospital_with_departments_and_patients(
    State(assembler): State<Arc<HospitalAssembler>>,
    Path(id): Path<i64>,
) -> Result<Json<HospitalView>> {
    Ok(Json(assembler.with_departments_and_patients(id).await?))
}

async fn hospital_with_patients(
    State(assembler): State<Arc<HospitalAssembler>>,
    Path(id): Path<i64>,
) -> Result<Json<HospitalView>> {
    Ok(Json(assembler.with_patients(id).await?))
}

pub fn department_routes(assembler: Arc<DepartmentAssembler>) -> Router {
    Router::new()
        .route("/departments/hospital/:id", get(departments_of_hospital))
        .route(
            "/departments/hospital/:id/with-patients",
            get(departments_of_hospital_with_patients),
        )
        .route("/departments/:id/with-children", get(department_with_children))
        .route("/departments/:id/with-patients", get(department_with_patients))
        .with_state(assembler)
}

/// Plain child listing; this is what the hospital service calls.
async fn departments_of_hospital(
    State(assembler): State<Arc<DepartmentAssembler>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Department>>> {
    let hospital = HospitalId::parse(id)?;
    let departments = assembler
        .departments()
        .find_by_parent(ParentKey::Hospital(hospital))
        .await?;
    Ok(Json(departments))
}

async fn departments_of_hospital_with_patients(
    State(assembler): State<Arc<DepartmentAssembler>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DepartmentView>>> {
    Ok(Json(assembler.by_hospital_with_patients(id).await?))
}

async fn department_with_children(
    State(assembler): State<Arc<DepartmentAssembler>>,
    Path(id): Path<i64>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<DepartmentView>> {
    let depth = Depth::from_query(query.depth)?;
    Ok(Json(assembler.with_children(id, depth).await?))
}

async fn department_with_patients(
    State(assembler): State<Arc<DepartmentAssembler>>,
    Path(id): Path<i64>,
) -> Result<Json<DepartmentView>> {
    Ok(Json(assembler.with_patients(id).await?))
}

pub fn patient_routes(patients: Arc<dyn Repository<Patient>>) -> Router {
    Router::new()
        .route("/patients/department/:id", get(patients_of_department))
        .route("/patients/hospital/:id", get(patients_of_hospital))
        .with_state(patients)
}

async fn patients_of_department(
    State(patients): State<Arc<dyn Repository<Patient>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Patient>>> {
    let department = DepartmentId::parse(id)?;
    Ok(Json(patients.find_by_parent(department.into()).await?))
}

async fn patients_of_hospital(
    State(patients): State<Arc<dyn Repository<Patient>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Patient>>> {
    let hospital = HospitalId::parse(id)?;
    Ok(Json(patients.find_by_parent(hospital.into()).await?))
}
