//! Inventory and restore records threaded between pipeline steps.
//!
//! These are the shapes handlers exchange through the host's input/output
//! mappings; the field names (including the upper-case `VDC` key) are part
//! of that contract and must survive serialization round trips.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A VM by name and director urn, before any VDC tagging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmRef {
    pub name: String,
    pub id: String,
}

/// A VM tagged with the VDC it lives in, used by the restore flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VdcVm {
    pub name: String,
    pub id: String,
    #[serde(rename = "VDC")]
    pub vdc: String,
}

impl VdcVm {
    /// Display label offered to the operator when selecting VMs.
    pub fn display_label(&self) -> String {
        format!("{} on {}", self.name, self.vdc)
    }
}

/// A restore point chosen for a VM after date filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestorePointSelection {
    pub vm_name: String,
    pub vm_id: String,
    pub restore_point_id: String,
    /// Raw `<date time>` suffix of the restore point name.
    pub creation_time: String,
    pub vdc: String,
}

/// A selected VM for which no usable restore point was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnprotectedVm {
    pub vm_name: String,
    pub vm_id: String,
    pub vdc: String,
}

/// Per-VM outcome of an instant-recovery trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantRecoveryOutcome {
    pub vm_name: String,
    pub restore_point_id: String,
    pub status: String,
    pub creation_time: String,
    /// Raw acknowledgement payload on success, `null` on failure.
    pub response: Option<Value>,
}

/// Per-VM outcome of a full-restore trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullRestoreOutcome {
    pub vm_name: String,
    pub vm_id: String,
    pub restore_point_id: String,
    pub task_id: Option<String>,
    pub status: String,
    pub creation_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vdc_vm_round_trips_with_upper_case_key() {
        let vm = VdcVm {
            name: "web-01".into(),
            id: "urn:vcloud:vm:1".into(),
            vdc: "vdc-a".into(),
        };
        let value = serde_json::to_value(&vm).unwrap();
        assert_eq!(value, json!({"name": "web-01", "id": "urn:vcloud:vm:1", "VDC": "vdc-a"}));
        assert_eq!(serde_json::from_value::<VdcVm>(value).unwrap(), vm);
    }

    #[test]
    fn display_label_matches_selection_format() {
        let vm = VdcVm {
            name: "db-02".into(),
            id: "urn:vcloud:vm:2".into(),
            vdc: "vdc-b".into(),
        };
        assert_eq!(vm.display_label(), "db-02 on vdc-b");
    }
}
