use super::{Department, Hospital, Patient};
use serde::{Deserialize, Serialize};

/// A root entity paired with the children collected for it at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct Attached<R, C> {
    pub root: R,
    pub children: Vec<C>,
}

impl<R, C> Attached<R, C> {
    pub fn new(root: R, children: Vec<C>) -> Self {
        Self { root, children }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentView {
    #[serde(flatten)]
    pub department: Department,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_list: Option<Vec<Patient>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalView {
    #[serde(flatten)]
    pub hospital: Hospital,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_list: Option<Vec<DepartmentView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_list: Option<Vec<Patient>>,
}

impl DepartmentView {
    pub fn bare(department: Department) -> Self {
        Self { department, patient_list: None }
    }
}

impl From<Attached<Department, Patient>> for DepartmentView {
    fn from(attached: Attached<Department, Patient>) -> Self {
        Self {
            department: attached.root,
            patient_list: Some(attached.children),
        }
    }
}

impl From<Attached<Hospital, Department>> for HospitalView {
    fn from(attached: Attached<Hospital, Department>) -> Self {
        Self {
            hospital: attached.root,
            department_list: Some(attached.children.into_iter().map(DepartmentView::bare).collect()),
            patient_list: None,
        }
    }
}

impl From<Attached<Hospital, Attached<Department, Patient>>> for HospitalView {
    fn from(attached: Attached<Hospital, Attached<Department, Patient>>) -> Self {
        Self {
            hospital: attached.root,
            department_list: Some(attached.children.into_iter().map(DepartmentView::from).collect()),
            patient_list: None,
        }
    }
}

impl From<Attached<Hospital, Patient>> for HospitalView {
    fn from(attached: Attached<Hospital, Patient>) -> Self {
        Self {
            hospital: attached.root,
            department_list: None,
            patient_list: Some(attached.children),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DepartmentId, HospitalId};

    #[test]
    fn test_requested_relation_is_always_serialized() {
        let hospital = Hospital {
            hospital_id: HospitalId(9),
            name: "North".to_string(),
            address: None,
        };
        let view = HospitalView::from(Attached::<Hospital, Department>::new(hospital, Vec::new()));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["hospitalId"], 9);
        assert_eq!(json["departmentList"], serde_json::json!([]));
        assert!(json.get("patientList").is_none());
    }

    #[test]
    fn test_nested_view_shape() {
        let hospital = Hospital {
            hospital_id: HospitalId(7),
            name: "St. Mary".to_string(),
            address: None,
        };
        let department = Department {
            department_id: DepartmentId(102),
            name: "Radiology".to_string(),
            hospital_id: HospitalId(7),
        };
        let view = HospitalView::from(Attached::new(
            hospital,
            vec![Attached::<Department, Patient>::new(department, Vec::new())],
        ));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["departmentList"][0]["departmentId"], 102);
        assert_eq!(json["departmentList"][0]["patientList"], serde_json::json!([]));

        let back: HospitalView = serde_json::from_value(json).unwrap();
        assert_eq!(back, view);
    }
}
