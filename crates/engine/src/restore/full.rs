//! `restore:full`: trigger a full VM restore per selected restore point on
//! the legacy manager API.
//!
//! Unlike instant recovery, a full restore copies the data back; the trigger
//! only starts an async task, so each outcome records the task id rather
//! than a final state.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use vaultline_api::ManagerApi;
use vaultline_types::{
    StepStatus, WorkflowLog,
    inventory::{FullRestoreOutcome, RestorePointSelection},
    log::CONTEXT_ALL_VMS,
    manager::{FullRestoreRequest, VmRestoreParameters, VmRestoreSpec},
};

use crate::{
    clients::manager_from_inputs,
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
    restore::failure_status,
};

pub struct FullRestore;

#[async_trait]
impl StepHandler for FullRestore {
    fn name(&self) -> &'static str {
        "restore:full"
    }

    fn summary(&self) -> &'static str {
        "Start a full VM restore for every selected restore point"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let points: Vec<RestorePointSelection> = ctx.require_typed(keys::RESTORE_POINTS)?;
        let root_name = ctx.optional_str(keys::HIERARCHY_ROOT).map(str::to_string);
        let power_on = ctx.bool_or(keys::POWER_ON, false);
        let client = manager_from_inputs(ctx)?;
        full_restore(&client, points, root_name.as_deref(), power_on, &mut ctx.log).await
    }
}

pub(crate) async fn full_restore(
    api: &dyn ManagerApi,
    points: Vec<RestorePointSelection>,
    hierarchy_root_name: Option<&str>,
    power_on: bool,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    log.push(CONTEXT_ALL_VMS, "Authenticate with backup manager", StepStatus::Success, "Using provided session token");

    let hierarchy_root_uid = match hierarchy_root_name {
        Some(name) => resolve_hierarchy_root(api, name, log).await?,
        None => None,
    };

    let mut results: Vec<FullRestoreOutcome> = Vec::new();
    for point in points {
        log.push(
            point.vm_name.clone(),
            "Start Restore",
            StepStatus::Info,
            format!("Starting restore for {} (Restore Point ID: {})", point.vm_name, point.restore_point_id),
        );

        let request = FullRestoreRequest {
            spec: VmRestoreSpec {
                power_on_after_restore: power_on,
                parameters: VmRestoreParameters {
                    vm_restore_point_uid: point.restore_point_id.clone(),
                    vm_new_name: None,
                },
                hierarchy_root_uid: hierarchy_root_uid.clone(),
            },
        };

        match api.restore_vm(&point.restore_point_id, &request).await {
            Ok(task) => {
                log.push(
                    point.vm_name.clone(),
                    "Perform Restore",
                    StepStatus::Success,
                    format!(
                        "Restore started for {}. Task ID: {}",
                        point.vm_name,
                        task.task_id.as_deref().unwrap_or("unknown")
                    ),
                );
                results.push(FullRestoreOutcome {
                    vm_name: point.vm_name,
                    vm_id: point.vm_id,
                    restore_point_id: point.restore_point_id,
                    task_id: task.task_id,
                    status: "Started".into(),
                    creation_time: point.creation_time,
                });
            }
            Err(error) => {
                warn!(vm = %point.vm_name, %error, "full restore trigger failed");
                log.push(
                    point.vm_name.clone(),
                    "Perform Restore",
                    StepStatus::Failure,
                    format!("Failed to start restore for {}: {error}", point.vm_name),
                );
                results.push(FullRestoreOutcome {
                    vm_name: point.vm_name,
                    vm_id: point.vm_id,
                    restore_point_id: point.restore_point_id,
                    task_id: None,
                    status: failure_status(&error),
                    creation_time: point.creation_time,
                });
            }
        }
    }

    log.push(
        CONTEXT_ALL_VMS,
        "Finalize Restore",
        StepStatus::Success,
        format!("Processed {} restore operations", results.len()),
    );

    // The downstream report step consumes the results as a JSON string.
    let rendered = serde_json::to_string_pretty(&json!({"restore_results": results}))?;
    Ok(outputs([(keys::RESTORE_RESULTS, json!(rendered))]))
}

/// Look the restore target's hierarchy root up by name.
///
/// A missing root is a warning, not an error: the manager then restores to
/// the point's original root, which is the common case.
async fn resolve_hierarchy_root(api: &dyn ManagerApi, name: &str, log: &mut WorkflowLog) -> Result<Option<String>> {
    let roots = match api.hierarchy_roots().await {
        Ok(listing) => listing.refs,
        Err(error) => {
            log.push(CONTEXT_ALL_VMS, "Fetch Hierarchy Root", StepStatus::Failure, error.to_string());
            return Err(error.into());
        }
    };
    match roots.iter().find(|root| root.name.eq_ignore_ascii_case(name)) {
        Some(root) => {
            log.push(
                CONTEXT_ALL_VMS,
                "Fetch Hierarchy Root",
                StepStatus::Success,
                format!("Found hierarchy root ID: {} for {name}", root.uid),
            );
            Ok(Some(root.uid.clone()))
        }
        None => {
            log.push(
                CONTEXT_ALL_VMS,
                "Fetch Hierarchy Root",
                StepStatus::Warning,
                format!("No hierarchy root found for name: {name}"),
            );
            Ok(None)
        }
    }
}
