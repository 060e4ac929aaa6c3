//! Payload models for the legacy backup-manager REST API.
//!
//! This API generation predates the OAuth2 one: entities are exposed as
//! `Refs` with urn-style `UID`s, field names are PascalCase, and mutations
//! answer `202 Accepted`. Only the fields the handlers touch are modeled.

use serde::{Deserialize, Serialize};

/// Listing envelope used by `/jobs`, `/backups` and `/vmRestorePoints`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefList {
    #[serde(default, rename = "Refs")]
    pub refs: Vec<ManagedRef>,
}

/// A referenced entity: backup job, backup, or restore point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedRef {
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Envelope returned by `GET /jobs/{id}/includes`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObjectsInJob {
    #[serde(default, rename = "ObjectInJobs")]
    pub objects: Vec<JobObject>,
}

/// One VM entry inside a backup job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobObject {
    /// Per-job membership id, required to remove the VM from the job again.
    #[serde(default, rename = "ObjectInJobId")]
    pub object_in_job_id: String,
    /// Hierarchy reference of the form `urn:vCloud:Vm:<root-uuid>.<vm-urn>`.
    #[serde(default, rename = "HierarchyObjRef")]
    pub hierarchy_obj_ref: String,
    #[serde(default, rename = "Name")]
    pub name: Option<String>,
}

/// Body for `POST /jobs/{id}/includes`.
#[derive(Debug, Clone, Serialize)]
pub struct JobIncludeRequest {
    #[serde(rename = "HierarchyObjRef")]
    pub hierarchy_obj_ref: String,
    #[serde(rename = "HierarchyObjName")]
    pub hierarchy_obj_name: String,
}

/// Accepted-restore acknowledgement carrying the async task id.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RestoreTask {
    #[serde(default, rename = "TaskId")]
    pub task_id: Option<String>,
}

/// Body for `POST /vmRestorePoints/{id}?action=restore`.
#[derive(Debug, Clone, Serialize)]
pub struct FullRestoreRequest {
    #[serde(rename = "VmRestoreSpec")]
    pub spec: VmRestoreSpec,
}

/// Nested restore specification for a full VM restore.
#[derive(Debug, Clone, Serialize)]
pub struct VmRestoreSpec {
    #[serde(rename = "PowerOnAfterRestore")]
    pub power_on_after_restore: bool,
    #[serde(rename = "VmRestoreParameters")]
    pub parameters: VmRestoreParameters,
    #[serde(rename = "HierarchyRootUid", skip_serializing_if = "Option::is_none")]
    pub hierarchy_root_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VmRestoreParameters {
    #[serde(rename = "VmRestorePointUid")]
    pub vm_restore_point_uid: String,
    #[serde(rename = "VmNewName", skip_serializing_if = "Option::is_none")]
    pub vm_new_name: Option<String>,
}
