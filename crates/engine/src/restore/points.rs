//! `restore:points`: join each selected VM to its backup and pick the
//! restore point to recover from.
//!
//! The join runs on names (see `vaultline_util::matching`) and is confirmed
//! against the owning job's member list before any point is considered, so
//! a VM name reused across VDCs cannot hijack another tenant's backup.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use tracing::info;
use vaultline_api::ManagerApi;
use vaultline_types::{
    StepStatus, WorkflowLog,
    inventory::{RestorePointSelection, UnprotectedVm, VdcVm},
    log::CONTEXT_ALL_VMS,
    manager::ManagedRef,
};
use vaultline_util::{
    date_handling::{parse_target_date, point_stamp_date, split_point_name},
    matching::{split_backup_name, vm_base_name, vm_urn_from_hierarchy_ref},
};

use crate::{
    clients::manager_from_inputs,
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

pub struct FetchRestorePoints;

#[async_trait]
impl StepHandler for FetchRestorePoints {
    fn name(&self) -> &'static str {
        "restore:points"
    }

    fn summary(&self) -> &'static str {
        "Pick a restore point per selected VM, latest or by date"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let selected: Vec<VdcVm> = ctx.require_typed(keys::SELECTED_VMS)?;
        let target_date = ctx.optional_str(keys::RESTORE_DATE).map(str::to_string);
        let client = manager_from_inputs(ctx)?;
        fetch_restore_points(&client, selected, target_date.as_deref(), &mut ctx.log).await
    }
}

pub(crate) async fn fetch_restore_points(
    api: &dyn ManagerApi,
    selected: Vec<VdcVm>,
    target_date: Option<&str>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    log.push(CONTEXT_ALL_VMS, "Authenticate with backup manager", StepStatus::Success, "Using provided session token");

    let backups = fetch_ref_listing(api, Listing::Backups, log).await?;
    let jobs = fetch_ref_listing(api, Listing::Jobs, log).await?;

    let mut matched: Vec<(VdcVm, String)> = Vec::new();
    let mut unprotected: Vec<UnprotectedVm> = Vec::new();
    for vm in selected.iter() {
        match match_vm_to_backup(api, vm, &backups, &jobs, log).await {
            Some(full_name) => matched.push((vm.clone(), full_name)),
            None => {
                log.push(
                    vm.name.clone(),
                    "Match VM to Backup",
                    StepStatus::Warning,
                    format!("No backup found for {}", vm.name),
                );
                unprotected.push(unprotected_entry(vm));
            }
        }
    }

    let points = fetch_ref_listing(api, Listing::RestorePoints, log).await?;

    let mut selections: Vec<RestorePointSelection> = Vec::new();
    for (vm, full_name) in matched {
        let target = match target_date {
            Some(raw) => match parse_target_date(raw) {
                Some(date) => Some(date),
                None => {
                    log.push(
                        vm.name.clone(),
                        "Select Restore Point",
                        StepStatus::Warning,
                        format!("Invalid date {raw} for {full_name}"),
                    );
                    unprotected.push(unprotected_entry(&vm));
                    continue;
                }
            },
            None => None,
        };

        match pick_restore_point(&points, &full_name, target) {
            PointChoice::Selected { uid, stamp } => {
                let message = match target {
                    Some(date) => format!("Selected restore point for {full_name} on {date}"),
                    None => format!("Using latest restore point for {full_name}"),
                };
                log.push(vm.name.clone(), "Select Restore Point", StepStatus::Success, message);
                selections.push(RestorePointSelection {
                    vm_name: vm.name.clone(),
                    vm_id: vm.id.clone(),
                    restore_point_id: uid,
                    creation_time: stamp,
                    vdc: vm.vdc.clone(),
                });
            }
            PointChoice::NoneOnDay(date) => {
                log.push(
                    vm.name.clone(),
                    "Select Restore Point",
                    StepStatus::Warning,
                    format!("No restore points for {full_name} on {date}"),
                );
                unprotected.push(unprotected_entry(&vm));
            }
            PointChoice::NoPoints => {
                log.push(
                    vm.name.clone(),
                    "Filter Restore Points",
                    StepStatus::Warning,
                    format!("No restore points for {full_name}"),
                );
                unprotected.push(unprotected_entry(&vm));
            }
        }
    }

    if !unprotected.is_empty() {
        let names: Vec<&str> = unprotected.iter().map(|vm| vm.vm_name.as_str()).collect();
        log.push(
            CONTEXT_ALL_VMS,
            "Finalize Restore Points",
            StepStatus::Warning,
            format!("{} out of {} VMs had no restore points: {}", unprotected.len(), selected.len(), names.join(", ")),
        );
    }
    info!(selected = selections.len(), unprotected = unprotected.len(), "restore point selection complete");
    log.push(
        CONTEXT_ALL_VMS,
        "Finalize Restore Points",
        StepStatus::Success,
        format!("Processed {} restore points", selections.len()),
    );

    Ok(outputs([
        (keys::RESTORE_POINTS, json!(selections)),
        (keys::UNPROTECTED_VMS, json!(unprotected)),
    ]))
}

enum Listing {
    Backups,
    Jobs,
    RestorePoints,
}

impl Listing {
    fn step(&self) -> &'static str {
        match self {
            Self::Backups => "Fetch Backups",
            Self::Jobs => "Fetch Backup Jobs",
            Self::RestorePoints => "Fetch Restore Points",
        }
    }
}

async fn fetch_ref_listing(api: &dyn ManagerApi, listing: Listing, log: &mut WorkflowLog) -> Result<Vec<ManagedRef>> {
    let result = match listing {
        Listing::Backups => api.backups().await,
        Listing::Jobs => api.jobs().await,
        Listing::RestorePoints => api.vm_restore_points().await,
    };
    match result {
        Ok(refs) => {
            log.push(
                CONTEXT_ALL_VMS,
                listing.step(),
                StepStatus::Success,
                format!("Retrieved {} {}", refs.refs.len(), listing.step().trim_start_matches("Fetch ").to_lowercase()),
            );
            Ok(refs.refs)
        }
        Err(error) => {
            log.push(CONTEXT_ALL_VMS, listing.step(), StepStatus::Failure, error.to_string());
            Err(error.into())
        }
    }
}

/// Find the backup covering a VM, confirmed through job membership.
///
/// Returns the backup's VM part (`"<vm name>-<suffix>"`), which is the key
/// restore point names are prefixed with.
async fn match_vm_to_backup(
    api: &dyn ManagerApi,
    vm: &VdcVm,
    backups: &[ManagedRef],
    jobs: &[ManagedRef],
    log: &mut WorkflowLog,
) -> Option<String> {
    for backup in backups {
        let Some((job_name, vm_part)) = split_backup_name(&backup.name) else {
            continue;
        };
        if !vm_base_name(vm_part).eq_ignore_ascii_case(&vm.name) {
            continue;
        }

        let Some(job) = jobs.iter().find(|job| job.name == job_name) else {
            log.push(
                vm.name.clone(),
                "Match VM to Backup",
                StepStatus::Warning,
                format!("No job found for job name {job_name} in backup {}", backup.name),
            );
            continue;
        };

        let members = match api.job_objects(&job.uid).await {
            Ok(listing) => listing.objects,
            Err(error) => {
                log.push(
                    vm.name.clone(),
                    "Match VM to Backup",
                    StepStatus::Warning,
                    format!("Failed to fetch job VMs for {}: {error}", job.uid),
                );
                continue;
            }
        };
        let confirmed = members
            .iter()
            .filter_map(|member| vm_urn_from_hierarchy_ref(&member.hierarchy_obj_ref))
            .any(|urn| urn == vm.id);
        if confirmed {
            log.push(
                vm.name.clone(),
                "Match VM to Backup",
                StepStatus::Success,
                format!("Matched {} to backup {}", vm.name, backup.name),
            );
            return Some(vm_part.to_string());
        }
    }
    None
}

fn unprotected_entry(vm: &VdcVm) -> UnprotectedVm {
    UnprotectedVm {
        vm_name: vm.name.clone(),
        vm_id: vm.id.clone(),
        vdc: vm.vdc.clone(),
    }
}

/// Result of picking a restore point for one VM.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PointChoice {
    Selected { uid: String, stamp: String },
    NoneOnDay(NaiveDate),
    NoPoints,
}

/// Pick the restore point for `full_name`: the newest one, or the newest on
/// the requested calendar day.
pub(crate) fn pick_restore_point(points: &[ManagedRef], full_name: &str, target: Option<NaiveDate>) -> PointChoice {
    let mut matching: Vec<(&ManagedRef, &str)> = points
        .iter()
        .filter_map(|point| {
            let (name, stamp) = split_point_name(&point.name)?;
            (name == full_name).then_some((point, stamp))
        })
        .collect();
    // Stamps are zero-padded `YYYY-MM-DD hh:mm:ss`, so the string order is
    // the chronological order.
    matching.sort_by(|a, b| b.1.cmp(a.1));

    if matching.is_empty() {
        return PointChoice::NoPoints;
    }
    match target {
        Some(date) => matching
            .iter()
            .find(|(_, stamp)| point_stamp_date(stamp) == Some(date))
            .map(|(point, stamp)| PointChoice::Selected {
                uid: point.uid.clone(),
                stamp: (*stamp).to_string(),
            })
            .unwrap_or(PointChoice::NoneOnDay(date)),
        None => {
            let (point, stamp) = matching[0];
            PointChoice::Selected {
                uid: point.uid.clone(),
                stamp: stamp.to_string(),
            }
        }
    }
}
