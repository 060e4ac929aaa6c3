//! `restore:instant`: trigger an instant recovery per selected restore
//! point on the modern backup-server API.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use vaultline_api::BackupServerApi;
use vaultline_types::{
    StepStatus, WorkflowLog,
    inventory::{InstantRecoveryOutcome, RestorePointSelection},
    log::CONTEXT_ALL_VMS,
    server::{InstantRecoverySpec, SecureRestoreSpec},
};
use vaultline_util::matching::urn_tail;

use crate::{
    clients::server_from_inputs,
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
    restore::failure_status,
};

pub struct InstantRecovery;

#[async_trait]
impl StepHandler for InstantRecovery {
    fn name(&self) -> &'static str {
        "restore:instant"
    }

    fn summary(&self) -> &'static str {
        "Start an instant recovery for every selected restore point"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let points: Vec<RestorePointSelection> = ctx.require_typed(keys::RESTORE_POINTS)?;
        let client = server_from_inputs(ctx)?;
        instant_recovery(&client, points, &mut ctx.log).await
    }
}

pub(crate) async fn instant_recovery(
    api: &dyn BackupServerApi,
    points: Vec<RestorePointSelection>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    log.push(CONTEXT_ALL_VMS, "Authenticate with backup server", StepStatus::Success, "Using provided bearer token");

    let mut results: Vec<InstantRecoveryOutcome> = Vec::new();
    for point in points {
        log.push(
            point.vm_name.clone(),
            "Start Instant Recovery",
            StepStatus::Info,
            format!(
                "Initiating instant recovery for {} from restore point {} (Created: {})",
                point.vm_name, point.restore_point_id, point.creation_time
            ),
        );

        let spec = InstantRecoverySpec {
            // The modern API addresses points by bare uuid, not urn.
            restore_point_id: urn_tail(&point.restore_point_id).to_string(),
            restore_type: "OriginalLocation".into(),
            vm_tags_restore_enabled: true,
            secure_restore: SecureRestoreSpec {
                antivirus_scan_enabled: true,
                virus_detection_action: "DisableNetwork".into(),
                entire_volume_scan_enabled: true,
            },
            nics_enabled: false,
            power_up: true,
            reason: "Instant Recovery to VMware vSphere".into(),
        };

        match api.instant_recovery(&spec).await {
            Ok(acknowledgement) => {
                log.push(
                    point.vm_name.clone(),
                    "Perform Instant Recovery",
                    StepStatus::Success,
                    format!("Successfully started instant recovery for {}", point.vm_name),
                );
                results.push(InstantRecoveryOutcome {
                    vm_name: point.vm_name,
                    restore_point_id: point.restore_point_id,
                    status: "Success".into(),
                    creation_time: point.creation_time,
                    response: Some(acknowledgement),
                });
            }
            Err(error) => {
                warn!(vm = %point.vm_name, %error, "instant recovery trigger failed");
                log.push(
                    point.vm_name.clone(),
                    "Perform Instant Recovery",
                    StepStatus::Failure,
                    format!("Failed to start instant recovery for {}: {error}", point.vm_name),
                );
                results.push(InstantRecoveryOutcome {
                    vm_name: point.vm_name,
                    restore_point_id: point.restore_point_id,
                    status: failure_status(&error),
                    creation_time: point.creation_time,
                    response: None,
                });
            }
        }
    }

    log.push(
        CONTEXT_ALL_VMS,
        "Finalize Instant Recovery",
        StepStatus::Success,
        format!("Processed {} instant recovery operations", results.len()),
    );

    // The downstream report step consumes the results as a JSON string.
    let rendered = serde_json::to_string_pretty(&json!({"restore_results": results}))?;
    Ok(outputs([(keys::RESTORE_RESULTS, json!(rendered))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServer;

    fn point(vm: &str, uid: &str) -> RestorePointSelection {
        RestorePointSelection {
            vm_name: vm.into(),
            vm_id: format!("urn:vcloud:vm:{vm}"),
            restore_point_id: uid.into(),
            creation_time: "2025-05-02 22:14:33".into(),
            vdc: "vdc-a".into(),
        }
    }

    #[tokio::test]
    async fn triggers_recovery_with_bare_uuid_and_hardening_options() {
        let fake = FakeServer::default();
        let mut log = WorkflowLog::new();

        let out = instant_recovery(&fake, vec![point("web-01", "urn:veeam:VmRestorePoint:abcd-1")], &mut log)
            .await
            .unwrap();

        let recovered = fake.recovered.lock().unwrap();
        assert_eq!(recovered[0].restore_point_id, "abcd-1");
        assert!(recovered[0].power_up);
        assert_eq!(recovered[0].secure_restore.virus_detection_action, "DisableNetwork");

        let rendered: serde_json::Value = serde_json::from_str(out[keys::RESTORE_RESULTS].as_str().unwrap()).unwrap();
        assert_eq!(rendered["restore_results"][0]["status"], json!("Success"));
    }

    #[tokio::test]
    async fn per_point_failures_do_not_abort_the_batch() {
        let fake = FakeServer {
            recovery_failures: ["bad-1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let mut log = WorkflowLog::new();

        let out = instant_recovery(&fake, vec![point("web-01", "bad-1"), point("db-01", "good-2")], &mut log)
            .await
            .unwrap();

        let rendered: serde_json::Value = serde_json::from_str(out[keys::RESTORE_RESULTS].as_str().unwrap()).unwrap();
        let results = rendered["restore_results"].as_array().unwrap();
        assert_eq!(results[0]["status"], json!("Failed: 500"));
        assert_eq!(results[0]["response"], serde_json::Value::Null);
        assert_eq!(results[1]["status"], json!("Success"));
        assert!(log.records().iter().any(|record| record.status == StepStatus::Failure));
    }
}
