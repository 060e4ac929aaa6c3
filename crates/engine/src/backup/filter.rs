//! `vm:filter`: drop candidate VMs that another job already protects.
//!
//! A VM must belong to exactly one backup job; before the standard job is
//! (re)filled, every other job's member list is consulted and candidates
//! found there are removed.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use vaultline_api::ManagerApi;
use vaultline_types::{StepStatus, WorkflowLog, inventory::VmRef};
use vaultline_util::matching::{has_standard_job_suffix, vm_urn_from_hierarchy_ref};

use crate::{
    clients::manager_from_inputs,
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

pub struct FilterProtectedVms;

#[async_trait]
impl StepHandler for FilterProtectedVms {
    fn name(&self) -> &'static str {
        "vm:filter"
    }

    fn summary(&self) -> &'static str {
        "Drop candidate VMs that other backup jobs already protect"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let candidates: Vec<VmRef> = ctx.require_typed(keys::ADDED_VMS)?;
        let own_job_id = ctx.optional_str(keys::JOB_ID).map(str::to_string);
        let excluded: Vec<String> = ctx.optional_typed(keys::EXCLUDED_JOB_IDS)?.unwrap_or_default();
        let client = manager_from_inputs(ctx)?;
        filter_protected(&client, &vdc_name, candidates, own_job_id.as_deref(), &excluded, &mut ctx.log).await
    }
}

pub(crate) async fn filter_protected(
    api: &dyn ManagerApi,
    vdc_name: &str,
    candidates: Vec<VmRef>,
    own_job_id: Option<&str>,
    excluded_job_ids: &[String],
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    let jobs = match api.jobs().await {
        Ok(listing) => listing.refs,
        Err(error) => {
            log.push(vdc_name, "Retrieve Backup Jobs", StepStatus::Failure, error.to_string());
            return Err(error.into());
        }
    };
    log.push(
        vdc_name,
        "Retrieve Backup Jobs",
        StepStatus::Success,
        format!("Retrieved {} backup jobs", jobs.len()),
    );

    let mut protected: HashSet<String> = HashSet::new();
    for job in &jobs {
        let is_own = own_job_id.is_some_and(|own| own == job.uid);
        if is_own || excluded_job_ids.contains(&job.uid) || has_standard_job_suffix(&job.name) {
            continue;
        }
        match api.job_objects(&job.uid).await {
            Ok(members) => {
                protected.extend(
                    members
                        .objects
                        .iter()
                        .filter_map(|member| vm_urn_from_hierarchy_ref(&member.hierarchy_obj_ref))
                        .map(str::to_string),
                );
            }
            Err(error) => {
                // One unreadable job must not abort the batch.
                log.push(
                    vdc_name,
                    format!("Retrieve VMs in Job {}", job.uid),
                    StepStatus::Failure,
                    error.to_string(),
                );
            }
        }
    }
    log.push(
        vdc_name,
        "Check Backed Up VMs",
        StepStatus::Success,
        format!("Total VMs already backed up in other jobs: {}", protected.len()),
    );

    let filtered: Vec<VmRef> = candidates.into_iter().filter(|vm| !protected.contains(&vm.id)).collect();
    log.push(
        vdc_name,
        "Filter VMs",
        StepStatus::Success,
        format!("VMs to be added to the backup job: {}", filtered.len()),
    );

    Ok(outputs([(keys::FILTERED_VMS, json!(filtered))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeManager, job_object, managed_ref};
    use vaultline_util::matching::compose_hierarchy_ref;

    fn vm(name: &str, id: &str) -> VmRef {
        VmRef {
            name: name.into(),
            id: id.into(),
        }
    }

    #[tokio::test]
    async fn skips_standard_and_excluded_jobs_when_collecting_protection() {
        let mut fake = FakeManager::default();
        fake.jobs = vec![
            managed_ref("urn:job:own", "vdc-a_Standard"),
            managed_ref("urn:job:legacy", "legacy nightly"),
            managed_ref("urn:job:excluded", "special"),
        ];
        fake.includes.insert(
            "urn:job:legacy".into(),
            vec![job_object("m1", &compose_hierarchy_ref("urn:root:r", "urn:vm:1"), "web-01")],
        );
        let mut log = WorkflowLog::new();

        let out = filter_protected(
            &fake,
            "vdc-a",
            vec![vm("web-01", "urn:vm:1"), vm("db-01", "urn:vm:2")],
            Some("urn:job:own"),
            &["urn:job:excluded".to_string()],
            &mut log,
        )
        .await
        .unwrap();

        // web-01 is protected by the legacy job; db-01 survives.
        assert_eq!(out[keys::FILTERED_VMS], json!([{"name": "db-01", "id": "urn:vm:2"}]));
    }

    #[tokio::test]
    async fn unreadable_job_is_logged_but_does_not_abort() {
        let mut fake = FakeManager::default();
        fake.jobs = vec![managed_ref("urn:job:broken", "opaque job")];
        // No includes entry -> the member listing fails.
        let mut log = WorkflowLog::new();

        let out = filter_protected(&fake, "vdc-a", vec![vm("web-01", "urn:vm:1")], None, &[], &mut log)
            .await
            .unwrap();

        assert_eq!(out[keys::FILTERED_VMS], json!([{"name": "web-01", "id": "urn:vm:1"}]));
        assert!(
            log.records()
                .iter()
                .any(|record| record.step == "Retrieve VMs in Job urn:job:broken" && record.status == StepStatus::Failure)
        );
    }

    #[tokio::test]
    async fn job_listing_failure_aborts_with_failure_record() {
        let fake = FakeManager {
            jobs_failures_before_success: 1,
            ..Default::default()
        };
        let mut log = WorkflowLog::new();

        let result = filter_protected(&fake, "vdc-a", vec![], None, &[], &mut log).await;
        assert!(result.is_err());
        assert_eq!(log.records()[0].status, StepStatus::Failure);
    }
}
