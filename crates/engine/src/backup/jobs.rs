//! Backup job maintenance steps: create the per-VDC standard job, find its
//! id, and keep its member list in sync with the director inventory.

use std::{collections::HashMap, time::Duration};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, json};
use tokio::time::sleep;
use tracing::{debug, warn};
use vaultline_api::{BackupServerApi, ManagerApi};
use vaultline_types::{
    StepStatus, WorkflowLog,
    inventory::VmRef,
    manager::JobIncludeRequest,
    server::{
        BackupProxies, DailySchedule, JobInclude, JobSchedule, JobSpec, JobStorage, JobVirtualMachines, RetentionPolicy,
        ScheduleRetry,
    },
};
use vaultline_util::matching::{compose_hierarchy_ref, is_standard_job_for, standard_job_name, urn_tail, vm_urn_from_hierarchy_ref};

use crate::{
    clients::{manager_from_inputs, server_from_inputs},
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

/// Days of retention configured on every standard job.
const RETENTION_DAYS: u32 = 7;
/// Local start time of the daily schedule.
const SCHEDULE_LOCAL_TIME: &str = "22:00";
/// Pause between consecutive member-add requests; the legacy API drops
/// mutations that arrive back to back.
const ADD_PACING_DELAY: Duration = Duration::from_secs(1);
/// Default attempts when searching for a freshly created job.
const DEFAULT_FIND_ATTEMPTS: u64 = 3;
/// Default pause between find attempts.
const DEFAULT_FIND_DELAY: Duration = Duration::from_secs(5);

/// `job:create`: create the VDC's standard backup job with the filtered
/// VM set, the shared retention policy and the nightly schedule.
pub struct CreateBackupJob;

#[async_trait]
impl StepHandler for CreateBackupJob {
    fn name(&self) -> &'static str {
        "job:create"
    }

    fn summary(&self) -> &'static str {
        "Create the VDC's standard backup job on the backup server"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let repository_name = ctx.require_str(keys::REPOSITORY_NAME)?.to_string();
        let host_name = ctx.require_str(keys::HIERARCHY_ROOT)?.to_string();
        let vms: Vec<VmRef> = ctx.require_typed(keys::FILTERED_VMS)?;
        let client = server_from_inputs(ctx)?;
        create_job(&client, &vdc_name, &repository_name, &host_name, vms, &mut ctx.log).await
    }
}

pub(crate) async fn create_job(
    api: &dyn BackupServerApi,
    vdc_name: &str,
    repository_name: &str,
    host_name: &str,
    vms: Vec<VmRef>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    let repositories = match api.repositories().await {
        Ok(listing) => listing.data,
        Err(error) => {
            log.push(vdc_name, "Retrieve Backup Repositories", StepStatus::Failure, error.to_string());
            return Err(error.into());
        }
    };
    if repositories.is_empty() {
        log.push(vdc_name, "Retrieve Backup Repositories", StepStatus::Failure, "No backup repositories found");
        bail!("no backup repositories found");
    }
    let Some(repository) = repositories.iter().find(|repository| repository.name == repository_name) else {
        let message = format!("Repository {repository_name} not found");
        log.push(vdc_name, "Retrieve Backup Repositories", StepStatus::Failure, message.clone());
        bail!(message);
    };
    log.push(
        vdc_name,
        "Retrieve Backup Repositories",
        StepStatus::Success,
        format!("Selected repository: {} (ID: {})", repository.name, repository.id),
    );

    if vms.is_empty() {
        log.push(vdc_name, "VM Validation", StepStatus::Failure, "No VMs provided for the new job");
        bail!("no VMs provided for the new job");
    }
    let vm_names: Vec<String> = vms.iter().map(|vm| vm.name.clone()).collect();
    let includes: Vec<JobInclude> = vms
        .iter()
        .map(|vm| JobInclude {
            object_type: "VirtualMachine".into(),
            platform: "CloudDirector".into(),
            host_name: host_name.to_string(),
            name: vm.name.clone(),
            object_id: vm.id.clone(),
        })
        .collect();

    let job_name = standard_job_name(vdc_name);
    let spec = JobSpec {
        name: job_name.clone(),
        description: format!("Standard Backup Job for {vdc_name}"),
        job_type: "CloudDirectorBackup".into(),
        is_high_priority: false,
        virtual_machines: JobVirtualMachines {
            includes,
            excludes: Map::new(),
        },
        storage: JobStorage {
            backup_repository_id: repository.id.clone(),
            backup_proxies: BackupProxies { auto_select: true },
            retention_policy: RetentionPolicy {
                policy_type: "Days".into(),
                quantity: RETENTION_DAYS,
            },
        },
        schedule: JobSchedule {
            run_automatically: true,
            daily: DailySchedule {
                is_enabled: true,
                daily_kind: "Everyday".into(),
                local_time: SCHEDULE_LOCAL_TIME.into(),
            },
            retry: ScheduleRetry { is_enabled: true },
        },
    };

    match api.create_job(&spec).await {
        Ok(()) => {
            log.push(vdc_name, "Create Backup Job", StepStatus::Success, format!("Backup job created: {job_name}"));
            log.push(
                vdc_name,
                "Add VMs to Job",
                StepStatus::Success,
                json!({"total_vms_processed": vm_names.len(), "vms_added": vm_names, "vms_failed": []}),
            );
            Ok(outputs([(keys::JOB_NAME, json!(job_name))]))
        }
        Err(error) => {
            log.push(
                vdc_name,
                "Create Backup Job",
                StepStatus::Failure,
                format!("Failed to create backup job: {error}"),
            );
            log.push(
                vdc_name,
                "Add VMs to Job",
                StepStatus::Failure,
                json!({"total_vms_processed": vm_names.len(), "vms_added": [], "vms_failed": vm_names}),
            );
            Err(error.into())
        }
    }
}

/// `job:find`: look the standard job up by name, retrying a fixed number
/// of times because the job appears asynchronously after creation.
pub struct FindJobId;

#[async_trait]
impl StepHandler for FindJobId {
    fn name(&self) -> &'static str {
        "job:find"
    }

    fn summary(&self) -> &'static str {
        "Find the VDC's standard job id, with a fixed retry loop"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let attempts = ctx.optional_u64(keys::MAX_RETRIES).unwrap_or(DEFAULT_FIND_ATTEMPTS).max(1);
        let delay = ctx
            .optional_u64(keys::RETRY_DELAY_SECS)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FIND_DELAY);
        let client = manager_from_inputs(ctx)?;
        find_job_id(&client, &vdc_name, attempts, delay, &mut ctx.log).await
    }
}

pub(crate) async fn find_job_id(
    api: &dyn ManagerApi,
    vdc_name: &str,
    max_attempts: u64,
    retry_delay: Duration,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    for attempt in 1..=max_attempts {
        let jobs = match api.jobs().await {
            Ok(listing) => listing.refs,
            Err(error) => {
                log.push(
                    vdc_name,
                    "Fetch Backup Jobs",
                    StepStatus::Failure,
                    format!("Attempt {attempt}/{max_attempts}: {error}"),
                );
                if attempt == max_attempts {
                    return Err(error.into());
                }
                sleep(retry_delay).await;
                continue;
            }
        };
        log.push(
            vdc_name,
            "Fetch Backup Jobs",
            StepStatus::Success,
            format!("Attempt {attempt}: Retrieved {} backup jobs", jobs.len()),
        );

        if let Some(job) = jobs.iter().find(|job| is_standard_job_for(&job.name, vdc_name)) {
            log.push(
                vdc_name,
                "Search Job ID",
                StepStatus::Success,
                format!("Matching job found: {} (ID: {})", job.name, job.uid),
            );
            return Ok(outputs([(keys::JOB_ID, json!(job.uid))]));
        }

        log.push(
            vdc_name,
            "Search Job ID Attempts",
            StepStatus::Failure,
            format!("Attempt {attempt}/{max_attempts}: No matching backup jobs found"),
        );
        if attempt < max_attempts {
            sleep(retry_delay).await;
        }
    }

    let message = format!(
        "Critical: Backup job '{}' not found after {max_attempts} attempts",
        standard_job_name(vdc_name)
    );
    warn!(vdc = %vdc_name, "{message}");
    log.push(vdc_name, "Search Job ID", StepStatus::Failure, message);
    // The host branches on a null id instead of aborting the pipeline.
    Ok(outputs([(keys::JOB_ID, serde_json::Value::Null)]))
}

/// `job:add-vms`: include each filtered VM in the standard job through the
/// legacy API, pacing the mutations and tallying partial failures.
pub struct AddVmsToJob;

#[async_trait]
impl StepHandler for AddVmsToJob {
    fn name(&self) -> &'static str {
        "job:add-vms"
    }

    fn summary(&self) -> &'static str {
        "Add the filtered VMs to the standard backup job"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let root_name = ctx.require_str(keys::HIERARCHY_ROOT)?.to_string();
        let Some(job_id) = ctx.optional_str(keys::JOB_ID).map(str::to_string) else {
            ctx.log.push(&vdc_name, "Read Backup Job ID", StepStatus::Failure, "Backup job ID not provided");
            bail!("backup job id not provided");
        };
        ctx.log.push(&vdc_name, "Read Backup Job ID", StepStatus::Success, format!("Backup job ID: {job_id}"));
        let vms: Vec<VmRef> = ctx.require_typed(keys::FILTERED_VMS)?;
        let client = manager_from_inputs(ctx)?;
        add_vms_to_job(&client, &vdc_name, &root_name, &job_id, vms, &mut ctx.log).await
    }
}

pub(crate) async fn add_vms_to_job(
    api: &dyn ManagerApi,
    vdc_name: &str,
    hierarchy_root_name: &str,
    job_id: &str,
    vms: Vec<VmRef>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    let roots = match api.hierarchy_roots().await {
        Ok(listing) => listing.refs,
        Err(error) => {
            log.push(vdc_name, "Retrieve Hierarchy Roots", StepStatus::Failure, error.to_string());
            return Err(error.into());
        }
    };
    log.push(vdc_name, "Retrieve Hierarchy Roots", StepStatus::Success, "Hierarchy roots retrieved successfully");

    let Some(root) = roots.iter().find(|root| root.name.eq_ignore_ascii_case(hierarchy_root_name)) else {
        let message = format!("Hierarchy root '{hierarchy_root_name}' not found");
        log.push(vdc_name, "Find Hierarchy Root ID", StepStatus::Failure, message.clone());
        bail!(message);
    };
    log.push(
        vdc_name,
        "Find Hierarchy Root ID",
        StepStatus::Success,
        format!("Hierarchy Root ID found: {}", root.uid),
    );

    if vms.is_empty() {
        log.push(vdc_name, "Load VM List", StepStatus::Success, "No VMs to add to the job");
        return Ok(StepOutputs::new());
    }

    let mut added: Vec<String> = Vec::new();
    let mut failed: Vec<String> = Vec::new();
    let total = vms.len();
    for (index, vm) in vms.into_iter().enumerate() {
        let include = JobIncludeRequest {
            hierarchy_obj_ref: compose_hierarchy_ref(&root.uid, &vm.id),
            hierarchy_obj_name: vm.name.clone(),
        };
        match api.add_job_object(job_id, &include).await {
            Ok(()) => {
                debug!(vm = %vm.name, "VM added to job");
                added.push(vm.name);
            }
            Err(error) => {
                warn!(vm = %vm.name, %error, "failed to add VM to job");
                failed.push(vm.name);
            }
        }
        if index + 1 < total {
            sleep(ADD_PACING_DELAY).await;
        }
    }

    let status = if failed.is_empty() { StepStatus::Success } else { StepStatus::PartialSuccess };
    log.push(
        vdc_name,
        "Add VMs to Job",
        status,
        json!({"total_vms_processed": total, "vms_added": added, "vms_failed": failed}),
    );
    Ok(StepOutputs::new())
}

/// `job:verify-vms`: confirm the job now contains exactly the intended
/// VMs: report members that never arrived and members present twice.
pub struct VerifyJobMembers;

#[async_trait]
impl StepHandler for VerifyJobMembers {
    fn name(&self) -> &'static str {
        "job:verify-vms"
    }

    fn summary(&self) -> &'static str {
        "Verify the job's member list against the intended VM set"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let job_id = ctx.require_str(keys::JOB_ID)?.to_string();
        let intended: Vec<VmRef> = ctx.require_typed(keys::FILTERED_VMS)?;
        let client = manager_from_inputs(ctx)?;
        verify_job_members(&client, &vdc_name, &job_id, intended, &mut ctx.log).await
    }
}

pub(crate) async fn verify_job_members(
    api: &dyn ManagerApi,
    vdc_name: &str,
    job_id: &str,
    intended: Vec<VmRef>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    let members = match api.job_objects(job_id).await {
        Ok(listing) => listing.objects,
        Err(error) => {
            log.push(vdc_name, "Fetch VMs in Job", StepStatus::Failure, error.to_string());
            return Err(error.into());
        }
    };
    log.push(
        vdc_name,
        "Fetch VMs in Job",
        StepStatus::Success,
        format!("Fetched {} VMs from job {job_id} via API", members.len()),
    );
    log.push(
        vdc_name,
        "Verify Added VMs - Initial Check",
        StepStatus::Success,
        format!("Intended to add {} VMs to job {job_id}, found {} VMs in job", intended.len(), members.len()),
    );

    let actual_tails: Vec<&str> = members
        .iter()
        .filter(|member| !member.object_in_job_id.is_empty())
        .map(|member| urn_tail(&member.hierarchy_obj_ref))
        .collect();

    let missing: Vec<serde_json::Value> = intended
        .iter()
        .filter(|vm| !actual_tails.contains(&urn_tail(&vm.id)))
        .map(|vm| json!({"id": urn_tail(&vm.id), "name": vm.name}))
        .collect();

    let mut seen: HashMap<&str, u32> = HashMap::new();
    let mut duplicates: Vec<serde_json::Value> = Vec::new();
    for member in &members {
        let tail = urn_tail(&member.hierarchy_obj_ref);
        if tail.is_empty() {
            continue;
        }
        let count = seen.entry(tail).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(json!({"id": tail, "name": member.name.clone().unwrap_or_else(|| "Unknown VM".into())}));
        }
    }

    let mut status = StepStatus::Success;
    if !missing.is_empty() {
        status = StepStatus::PartialSuccess;
    }
    if !duplicates.is_empty() {
        status = if status == StepStatus::Success {
            StepStatus::PartialSuccess
        } else {
            StepStatus::Failure
        };
    }

    log.push(
        vdc_name,
        "Verify Added VMs",
        status,
        json!({
            "intended_vms_count": intended.len(),
            "actual_vms_count": members.len(),
            "missing_vms": missing,
            "duplicate_vms": duplicates,
        }),
    );
    Ok(StepOutputs::new())
}

/// `job:prune-vms`: remove members whose VMs vanished from the director
/// inventory, so the job stops failing on deleted machines.
pub struct PruneJobMembers;

#[async_trait]
impl StepHandler for PruneJobMembers {
    fn name(&self) -> &'static str {
        "job:prune-vms"
    }

    fn summary(&self) -> &'static str {
        "Remove job members whose VMs were deleted from the director"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let missing: Vec<VmRef> = ctx.optional_typed(keys::MISSING_VMS)?.unwrap_or_default();
        if missing.is_empty() {
            ctx.log.push(&vdc_name, "Check Missing VMs", StepStatus::Success, "No deleted VMs provided to remove");
            return Ok(StepOutputs::new());
        }
        let job_id = ctx.require_str(keys::JOB_ID)?.to_string();
        let client = manager_from_inputs(ctx)?;
        prune_job_members(&client, &vdc_name, &job_id, missing, &mut ctx.log).await
    }
}

pub(crate) async fn prune_job_members(
    api: &dyn ManagerApi,
    vdc_name: &str,
    job_id: &str,
    missing: Vec<VmRef>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    log.push(
        vdc_name,
        "Check Missing VMs",
        StepStatus::Success,
        format!("Found {} deleted VMs to remove", missing.len()),
    );

    let members = match api.job_objects(job_id).await {
        Ok(listing) => listing.objects,
        Err(error) => {
            log.push(vdc_name, "Fetch Job VMs", StepStatus::Failure, error.to_string());
            return Err(error.into());
        }
    };
    log.push(
        vdc_name,
        "Fetch Job VMs",
        StepStatus::Success,
        format!("Retrieved {} VMs from job {job_id}", members.len()),
    );

    let by_vm_urn: HashMap<&str, &vaultline_types::manager::JobObject> = members
        .iter()
        .filter_map(|member| vm_urn_from_hierarchy_ref(&member.hierarchy_obj_ref).map(|urn| (urn, member)))
        .collect();

    let mut removed: Vec<String> = Vec::new();
    let mut failed: Vec<String> = Vec::new();
    let total = missing.len();
    for vm in missing {
        let Some(member) = by_vm_urn.get(vm.id.as_str()) else {
            debug!(vm = %vm.name, "VM not found in job, skipping removal");
            failed.push(vm.name);
            continue;
        };
        match api.remove_job_object(job_id, &member.object_in_job_id).await {
            Ok(()) => removed.push(vm.name),
            Err(error) => {
                warn!(vm = %vm.name, %error, "failed to remove VM from job");
                failed.push(vm.name);
            }
        }
    }

    let status = if failed.is_empty() { StepStatus::Success } else { StepStatus::PartialSuccess };
    log.push(
        vdc_name,
        "Remove Missing VMs",
        status,
        json!({"total_vms_processed": total, "vms_removed": removed, "vms_failed": failed}),
    );
    Ok(StepOutputs::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeManager, FakeServer, job_object, managed_ref};
    use vaultline_types::server::Repository;

    fn vm(name: &str, id: &str) -> VmRef {
        VmRef {
            name: name.into(),
            id: id.into(),
        }
    }

    fn server_with_repo() -> FakeServer {
        FakeServer {
            repositories: vaultline_types::server::RepositoryList {
                data: vec![Repository {
                    id: "repo-1".into(),
                    name: "tenant-repo".into(),
                }],
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_job_builds_the_standard_spec() {
        let fake = server_with_repo();
        let mut log = WorkflowLog::new();

        let out = create_job(
            &fake,
            "vdc-a",
            "tenant-repo",
            "portal.example.com",
            vec![vm("web-01", "urn:vm:1")],
            &mut log,
        )
        .await
        .unwrap();

        assert_eq!(out[keys::JOB_NAME], json!("vdc-a_Standard"));
        let created = fake.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].storage.backup_repository_id, "repo-1");
        assert_eq!(created[0].storage.retention_policy.quantity, RETENTION_DAYS);
        assert_eq!(created[0].virtual_machines.includes[0].host_name, "portal.example.com");
    }

    #[tokio::test]
    async fn create_job_rejects_unknown_repository() {
        let fake = server_with_repo();
        let mut log = WorkflowLog::new();

        let result = create_job(&fake, "vdc-a", "other-repo", "portal", vec![vm("a", "urn:1")], &mut log).await;
        assert!(result.is_err());
        assert!(log.records().iter().any(|record| record.status == StepStatus::Failure));
        assert!(fake.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_job_failure_tallies_every_vm_as_failed() {
        let fake = FakeServer {
            create_job_fails: true,
            ..server_with_repo()
        };
        let mut log = WorkflowLog::new();

        let result = create_job(&fake, "vdc-a", "tenant-repo", "portal", vec![vm("a", "urn:1"), vm("b", "urn:2")], &mut log).await;
        assert!(result.is_err());
        let tally = log.records().last().unwrap();
        assert_eq!(tally.step, "Add VMs to Job");
        assert_eq!(tally.details["vms_failed"], json!(["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn find_job_id_retries_until_the_job_appears() {
        let fake = FakeManager {
            jobs: vec![managed_ref("urn:job:1", "vdc-a_Standard")],
            jobs_failures_before_success: 2,
            ..Default::default()
        };
        let mut log = WorkflowLog::new();

        let out = find_job_id(&fake, "vdc-a", 3, Duration::from_secs(5), &mut log).await.unwrap();
        assert_eq!(out[keys::JOB_ID], json!("urn:job:1"));
        assert_eq!(fake.jobs_calls(), 3);
        // Two failure records, then the fetch + match successes.
        assert_eq!(
            log.records().iter().filter(|record| record.status == StepStatus::Failure).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn find_job_id_exhausts_attempts_to_a_null_id() {
        let fake = FakeManager {
            jobs: vec![managed_ref("urn:job:2", "unrelated job")],
            ..Default::default()
        };
        let mut log = WorkflowLog::new();

        let out = find_job_id(&fake, "vdc-a", 2, Duration::from_secs(5), &mut log).await.unwrap();
        assert_eq!(out[keys::JOB_ID], serde_json::Value::Null);
        let last = log.records().last().unwrap();
        assert!(last.details.as_str().unwrap().starts_with("Critical:"));
    }

    #[tokio::test(start_paused = true)]
    async fn add_vms_tallies_partial_success() {
        let fake = FakeManager {
            roots: vec![managed_ref("urn:root:aaaa", "portal.example.com")],
            add_failures: ["db-01".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let mut log = WorkflowLog::new();

        add_vms_to_job(
            &fake,
            "vdc-a",
            "portal.example.com",
            "urn:job:1",
            vec![vm("web-01", "urn:vm:1"), vm("db-01", "urn:vm:2")],
            &mut log,
        )
        .await
        .unwrap();

        let tally = log.records().last().unwrap();
        assert_eq!(tally.status, StepStatus::PartialSuccess);
        assert_eq!(tally.details["vms_added"], json!(["web-01"]));
        assert_eq!(tally.details["vms_failed"], json!(["db-01"]));

        let added = fake.added.lock().unwrap();
        assert_eq!(added[0].1.hierarchy_obj_ref, "urn:vCloud:Vm:aaaa.urn:vm:1");
    }

    #[tokio::test]
    async fn add_vms_requires_a_known_hierarchy_root() {
        let fake = FakeManager::default();
        let mut log = WorkflowLog::new();

        let result = add_vms_to_job(&fake, "vdc-a", "missing-root", "urn:job:1", vec![vm("a", "urn:1")], &mut log).await;
        assert!(result.is_err());
        let last = log.records().last().unwrap();
        assert_eq!(last.step, "Find Hierarchy Root ID");
    }

    #[tokio::test]
    async fn verify_reports_missing_and_duplicate_members() {
        let mut fake = FakeManager::default();
        fake.includes.insert(
            "urn:job:1".into(),
            vec![
                job_object("m1", "urn:vCloud:Vm:aaaa.urn:vcloud:vm:one", "web-01"),
                job_object("m2", "urn:vCloud:Vm:aaaa.urn:vcloud:vm:one", "web-01"),
            ],
        );
        let mut log = WorkflowLog::new();

        verify_job_members(
            &fake,
            "vdc-a",
            "urn:job:1",
            vec![vm("web-01", "urn:vcloud:vm:one"), vm("db-01", "urn:vcloud:vm:two")],
            &mut log,
        )
        .await
        .unwrap();

        let verdict = log.records().last().unwrap();
        // Missing db-01 and a duplicated web-01 together escalate to failure.
        assert_eq!(verdict.status, StepStatus::Failure);
        assert_eq!(verdict.details["missing_vms"], json!([{"id": "two", "name": "db-01"}]));
        assert_eq!(verdict.details["duplicate_vms"], json!([{"id": "one", "name": "web-01"}]));
    }

    #[tokio::test]
    async fn prune_removes_known_members_and_flags_strays() {
        let mut fake = FakeManager::default();
        fake.includes.insert(
            "urn:job:1".into(),
            vec![job_object("m1", "urn:vCloud:Vm:aaaa.urn:vcloud:vm:one", "web-01")],
        );
        let mut log = WorkflowLog::new();

        prune_job_members(
            &fake,
            "vdc-a",
            "urn:job:1",
            vec![vm("web-01", "urn:vcloud:vm:one"), vm("ghost", "urn:vcloud:vm:nine")],
            &mut log,
        )
        .await
        .unwrap();

        assert_eq!(*fake.removed.lock().unwrap(), vec![("urn:job:1".to_string(), "m1".to_string())]);
        let tally = log.records().last().unwrap();
        assert_eq!(tally.status, StepStatus::PartialSuccess);
        assert_eq!(tally.details["vms_removed"], json!(["web-01"]));
        assert_eq!(tally.details["vms_failed"], json!(["ghost"]));
    }
}
