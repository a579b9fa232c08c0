//! Partial updates expressed as an explicit update mask.
//!
//! A field missing from the request body is left untouched, a field sent as
//! `null` is cleared, and a field sent with a value is overwritten. Required
//! fields refuse to be cleared. Primary keys are not part of any mask.

use super::{Department, DepartmentId, Entity, Hospital, HospitalId, Patient};
use crate::error::{CarenetError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the field is present; absence goes through `Default`.
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

impl<T> Patch<T> {
    fn apply_required(self, field: &str, target: &mut T) -> Result<()> {
        match self {
            Patch::Unchanged => Ok(()),
            Patch::Set(value) => {
                *target = value;
                Ok(())
            }
            Patch::Clear => Err(CarenetError::InvalidInput(format!(
                "field '{}' cannot be cleared",
                field
            ))),
        }
    }

    fn apply_optional(self, target: &mut Option<T>) {
        match self {
            Patch::Unchanged => {}
            Patch::Set(value) => *target = Some(value),
            Patch::Clear => *target = None,
        }
    }
}

pub trait Patchable: Entity {
    type Patch: DeserializeOwned + Send + 'static;

    fn apply_patch(&mut self, patch: Self::Patch) -> Result<()>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HospitalPatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub address: Patch<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DepartmentPatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub hospital_id: Patch<HospitalId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientPatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub department_id: Patch<DepartmentId>,
    #[serde(default)]
    pub hospital_id: Patch<HospitalId>,
}

impl Patchable for Hospital {
    type Patch = HospitalPatch;

    fn apply_patch(&mut self, patch: HospitalPatch) -> Result<()> {
        patch.name.apply_required("name", &mut self.name)?;
        patch.address.apply_optional(&mut self.address);
        Ok(())
    }
}

impl Patchable for Department {
    type Patch = DepartmentPatch;

    fn apply_patch(&mut self, patch: DepartmentPatch) -> Result<()> {
        patch.name.apply_required("name", &mut self.name)?;
        patch.hospital_id.apply_required("hospitalId", &mut self.hospital_id)?;
        Ok(())
    }
}

impl Patchable for Patient {
    type Patch = PatientPatch;

    fn apply_patch(&mut self, patch: PatientPatch) -> Result<()> {
        patch.name.apply_required("name", &mut self.name)?;
        patch.department_id.apply_required("departmentId", &mut self.department_id)?;
        patch.hospital_id.apply_required("hospitalId", &mut self.hospital_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hospital() -> Hospital {
        Hospital {
            hospital_id: HospitalId(7),
            name: "St. Mary".to_string(),
            address: Some("1 Main St".to_string()),
        }
    }

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        let patch: HospitalPatch = serde_json::from_str(r#"{"address": null}"#).unwrap();
        assert_eq!(patch.name, Patch::Unchanged);
        assert_eq!(patch.address, Patch::Clear);

        let patch: HospitalPatch = serde_json::from_str(r#"{"name": "General"}"#).unwrap();
        assert_eq!(patch.name, Patch::Set("General".to_string()));
        assert_eq!(patch.address, Patch::Unchanged);
    }

    #[test]
    fn test_clear_optional_field() {
        let mut h = hospital();
        let patch: HospitalPatch = serde_json::from_str(r#"{"address": null}"#).unwrap();
        h.apply_patch(patch).unwrap();
        assert_eq!(h.address, None);
        assert_eq!(h.name, "St. Mary");
    }

    #[test]
    fn test_clear_required_field_is_rejected() {
        let mut h = hospital();
        let patch: HospitalPatch = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert!(matches!(h.apply_patch(patch), Err(CarenetError::InvalidInput(_))));
    }

    #[test]
    fn test_key_is_not_patchable() {
        let parsed = serde_json::from_str::<HospitalPatch>(r#"{"hospitalId": 9}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_patch_moves_patient() {
        let mut patient = Patient {
            patient_id: crate::model::PatientId(1),
            name: "Ada".to_string(),
            department_id: DepartmentId(101),
            hospital_id: HospitalId(7),
        };
        let patch: PatientPatch = serde_json::from_str(r#"{"departmentId": 102}"#).unwrap();
        patient.apply_patch(patch).unwrap();
        assert_eq!(patient.department_id, DepartmentId(102));
        assert_eq!(patient.hospital_id, HospitalId(7));
    }
}
