pub mod patch;
pub mod view;

pub use patch::{DepartmentPatch, HospitalPatch, Patch, Patchable, PatientPatch};
pub use view::{Attached, DepartmentView, HospitalView};

use crate::error::{CarenetError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Integer identity of a stored entity.
pub trait EntityKey:
    Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + Serialize + DeserializeOwned + 'static
{
    fn from_raw(raw: i64) -> Self;
    fn raw(self) -> i64;

    /// Keys are only valid when strictly positive.
    fn parse(raw: i64) -> Result<Self> {
        if raw <= 0 {
            return Err(CarenetError::InvalidInput(format!(
                "key must be a positive integer, got {}",
                raw
            )));
        }
        Ok(Self::from_raw(raw))
    }
}

macro_rules! entity_key {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl EntityKey for $name {
            fn from_raw(raw: i64) -> Self {
                $name(raw)
            }

            fn raw(self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_key!(HospitalId);
entity_key!(DepartmentId);
entity_key!(PatientId);

/// Foreign key pointing at the entity that owns a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Hospital(HospitalId),
    Department(DepartmentId),
}

impl ParentKey {
    /// JSON field holding this foreign key on the child document.
    pub fn field(&self) -> &'static str {
        match self {
            ParentKey::Hospital(_) => "hospitalId",
            ParentKey::Department(_) => "departmentId",
        }
    }

    pub fn raw(&self) -> i64 {
        match self {
            ParentKey::Hospital(id) => id.raw(),
            ParentKey::Department(id) => id.raw(),
        }
    }
}

impl From<HospitalId> for ParentKey {
    fn from(id: HospitalId) -> Self {
        ParentKey::Hospital(id)
    }
}

impl From<DepartmentId> for ParentKey {
    fn from(id: DepartmentId) -> Self {
        ParentKey::Department(id)
    }
}

pub trait Entity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Key: EntityKey;

    /// Collection name, used for routes and table names.
    const KIND: &'static str;

    fn key(&self) -> Self::Key;
    fn set_key(&mut self, key: Self::Key);
    fn parents(&self) -> Vec<ParentKey>;

    /// Own key and every foreign key must be strictly positive.
    fn validate_keys(&self) -> Result<()> {
        Self::Key::parse(self.key().raw())?;
        for parent in self.parents() {
            if parent.raw() <= 0 {
                return Err(CarenetError::InvalidInput(format!(
                    "{} must be a positive integer, got {}",
                    parent.field(),
                    parent.raw()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub hospital_id: HospitalId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub department_id: DepartmentId,
    pub name: String,
    pub hospital_id: HospitalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub patient_id: PatientId,
    pub name: String,
    pub department_id: DepartmentId,
    pub hospital_id: HospitalId,
}

impl Entity for Hospital {
    type Key = HospitalId;
    const KIND: &'static str = "hospitals";

    fn key(&self) -> HospitalId {
        self.hospital_id
    }

    fn set_key(&mut self, key: HospitalId) {
        self.hospital_id = key;
    }

    fn parents(&self) -> Vec<ParentKey> {
        Vec::new()
    }
}

impl Entity for Department {
    type Key = DepartmentId;
    const KIND: &'static str = "departments";

    fn key(&self) -> DepartmentId {
        self.department_id
    }

    fn set_key(&mut self, key: DepartmentId) {
        self.department_id = key;
    }

    fn parents(&self) -> Vec<ParentKey> {
        vec![ParentKey::Hospital(self.hospital_id)]
    }
}

impl Entity for Patient {
    type Key = PatientId;
    const KIND: &'static str = "patients";

    fn key(&self) -> PatientId {
        self.patient_id
    }

    fn set_key(&mut self, key: PatientId) {
        self.patient_id = key;
    }

    fn parents(&self) -> Vec<ParentKey> {
        vec![
            ParentKey::Department(self.department_id),
            ParentKey::Hospital(self.hospital_id),
        ]
    }
}
