//! In-memory vendor API fakes shared by handler tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    sync::atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use vaultline_api::{ApiError, ApiResult, BackupServerApi, ManagerApi};
use vaultline_types::{
    manager::{FullRestoreRequest, JobIncludeRequest, JobObject, ManagedRef, ObjectsInJob, RefList, RestoreTask},
    server::{InstantRecoverySpec, JobSpec, RepositoryList},
};

pub(crate) fn managed_ref(uid: &str, name: &str) -> ManagedRef {
    ManagedRef {
        uid: uid.into(),
        name: name.into(),
    }
}

pub(crate) fn job_object(object_in_job_id: &str, hierarchy_obj_ref: &str, name: &str) -> JobObject {
    JobObject {
        object_in_job_id: object_in_job_id.into(),
        hierarchy_obj_ref: hierarchy_obj_ref.into(),
        name: Some(name.into()),
    }
}

/// Scriptable fake of the legacy manager API.
#[derive(Default)]
pub(crate) struct FakeManager {
    pub jobs: Vec<ManagedRef>,
    pub backups: Vec<ManagedRef>,
    pub points: Vec<ManagedRef>,
    pub roots: Vec<ManagedRef>,
    /// Job uid -> members; jobs absent from the map fail their listing.
    pub includes: HashMap<String, Vec<JobObject>>,
    /// `jobs()` fails this many times before succeeding (retry tests).
    pub jobs_failures_before_success: u32,
    pub(crate) jobs_calls: AtomicU32,
    /// Include names whose add request is rejected.
    pub add_failures: HashSet<String>,
    /// Membership ids whose removal is rejected.
    pub remove_failures: HashSet<String>,
    /// Restore point ids whose restore trigger is rejected.
    pub restore_failures: HashSet<String>,
    pub added: Mutex<Vec<(String, JobIncludeRequest)>>,
    pub removed: Mutex<Vec<(String, String)>>,
    pub restored: Mutex<Vec<(String, Value)>>,
    pub deleted_sessions: Mutex<Vec<String>>,
}

impl FakeManager {
    pub(crate) fn jobs_calls(&self) -> u32 {
        self.jobs_calls.load(Ordering::SeqCst)
    }
}

fn rejected(status: u16, body: &str) -> ApiError {
    ApiError::Status {
        status,
        body: body.into(),
    }
}

#[async_trait]
impl ManagerApi for FakeManager {
    async fn jobs(&self) -> ApiResult<RefList> {
        let call = self.jobs_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.jobs_failures_before_success {
            return Err(rejected(500, "manager unavailable"));
        }
        Ok(RefList { refs: self.jobs.clone() })
    }

    async fn backups(&self) -> ApiResult<RefList> {
        Ok(RefList {
            refs: self.backups.clone(),
        })
    }

    async fn vm_restore_points(&self) -> ApiResult<RefList> {
        Ok(RefList {
            refs: self.points.clone(),
        })
    }

    async fn hierarchy_roots(&self) -> ApiResult<RefList> {
        Ok(RefList { refs: self.roots.clone() })
    }

    async fn job_objects(&self, job_id: &str) -> ApiResult<ObjectsInJob> {
        self.includes
            .get(job_id)
            .map(|objects| ObjectsInJob {
                objects: objects.clone(),
            })
            .ok_or_else(|| rejected(404, "job not found"))
    }

    async fn add_job_object(&self, job_id: &str, include: &JobIncludeRequest) -> ApiResult<()> {
        if self.add_failures.contains(&include.hierarchy_obj_name) {
            return Err(rejected(500, "add rejected"));
        }
        self.added.lock().unwrap().push((job_id.to_string(), include.clone()));
        Ok(())
    }

    async fn remove_job_object(&self, job_id: &str, object_in_job_id: &str) -> ApiResult<()> {
        if self.remove_failures.contains(object_in_job_id) {
            return Err(rejected(500, "remove rejected"));
        }
        self.removed.lock().unwrap().push((job_id.to_string(), object_in_job_id.to_string()));
        Ok(())
    }

    async fn restore_vm(&self, restore_point_id: &str, restore: &FullRestoreRequest) -> ApiResult<RestoreTask> {
        if self.restore_failures.contains(restore_point_id) {
            return Err(rejected(500, "restore rejected"));
        }
        let body = serde_json::to_value(restore).unwrap();
        self.restored.lock().unwrap().push((restore_point_id.to_string(), body));
        Ok(RestoreTask {
            task_id: Some(format!("task-{restore_point_id}")),
        })
    }

    async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        self.deleted_sessions.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

/// Scriptable fake of the modern backup-server API.
#[derive(Default)]
pub(crate) struct FakeServer {
    pub repositories: RepositoryList,
    pub create_job_fails: bool,
    /// Restore point ids whose instant recovery is rejected.
    pub recovery_failures: HashSet<String>,
    pub created: Mutex<Vec<JobSpec>>,
    pub recovered: Mutex<Vec<InstantRecoverySpec>>,
    pub logouts: AtomicU32,
}

#[async_trait]
impl BackupServerApi for FakeServer {
    async fn repositories(&self) -> ApiResult<RepositoryList> {
        Ok(RepositoryList {
            data: self.repositories.data.clone(),
        })
    }

    async fn create_job(&self, spec: &JobSpec) -> ApiResult<()> {
        if self.create_job_fails {
            return Err(rejected(400, "invalid job specification"));
        }
        self.created.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn instant_recovery(&self, spec: &InstantRecoverySpec) -> ApiResult<Value> {
        if self.recovery_failures.contains(&spec.restore_point_id) {
            return Err(rejected(500, "recovery rejected"));
        }
        self.recovered.lock().unwrap().push(spec.clone());
        Ok(json!({"id": format!("session-{}", spec.restore_point_id), "state": "Starting"}))
    }

    async fn logout(&self) -> ApiResult<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
