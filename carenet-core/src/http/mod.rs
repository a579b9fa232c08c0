pub mod composite;
pub mod crud;
pub mod error;
pub mod ops;

pub use composite::{department_routes, hospital_routes, patient_routes, DepthQuery};
pub use crud::crud_routes;
pub use ops::{ops_routes, OpsState};
