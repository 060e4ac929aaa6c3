//! Payload models for the modern backup-server REST API.
//!
//! The OAuth2 generation uses camelCase fields and versioned `/api/v1`
//! routes. Job creation and instant recovery take fully-specified request
//! bodies; the builders here mirror the shapes the service validates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope returned by `GET /api/v1/backupInfrastructure/repositories`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RepositoryList {
    #[serde(default)]
    pub data: Vec<Repository>,
}

/// A backup repository eligible to store job data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
}

/// Body for `POST /api/v1/jobs` creating a cloud-director backup job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub is_high_priority: bool,
    pub virtual_machines: JobVirtualMachines,
    pub storage: JobStorage,
    pub schedule: JobSchedule,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobVirtualMachines {
    pub includes: Vec<JobInclude>,
    /// The service requires the key to be present even when empty.
    pub excludes: Map<String, Value>,
}

/// One VM included in a job, addressed through the director hierarchy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInclude {
    #[serde(rename = "type")]
    pub object_type: String,
    pub platform: String,
    pub host_name: String,
    pub name: String,
    pub object_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStorage {
    pub backup_repository_id: String,
    pub backup_proxies: BackupProxies,
    pub retention_policy: RetentionPolicy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProxies {
    pub auto_select: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    #[serde(rename = "type")]
    pub policy_type: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSchedule {
    pub run_automatically: bool,
    pub daily: DailySchedule,
    pub retry: ScheduleRetry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySchedule {
    pub is_enabled: bool,
    pub daily_kind: String,
    pub local_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRetry {
    pub is_enabled: bool,
}

/// Body for `POST /api/v1/restore/instantRecovery/vSphere/vm`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantRecoverySpec {
    pub restore_point_id: String,
    #[serde(rename = "type")]
    pub restore_type: String,
    pub vm_tags_restore_enabled: bool,
    pub secure_restore: SecureRestoreSpec,
    pub nics_enabled: bool,
    /// The service expects this one field in PascalCase.
    #[serde(rename = "PowerUp")]
    pub power_up: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureRestoreSpec {
    pub antivirus_scan_enabled: bool,
    pub virus_detection_action: String,
    pub entire_volume_scan_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_spec_serializes_vendor_field_names() {
        let spec = JobSpec {
            name: "vdc-a_Standard".into(),
            description: "Standard Backup Job for vdc-a".into(),
            job_type: "CloudDirectorBackup".into(),
            is_high_priority: false,
            virtual_machines: JobVirtualMachines {
                includes: vec![JobInclude {
                    object_type: "VirtualMachine".into(),
                    platform: "CloudDirector".into(),
                    host_name: "portal.example.com".into(),
                    name: "web-01".into(),
                    object_id: "urn:vcloud:vm:1".into(),
                }],
                excludes: Map::new(),
            },
            storage: JobStorage {
                backup_repository_id: "repo-1".into(),
                backup_proxies: BackupProxies { auto_select: true },
                retention_policy: RetentionPolicy {
                    policy_type: "Days".into(),
                    quantity: 7,
                },
            },
            schedule: JobSchedule {
                run_automatically: true,
                daily: DailySchedule {
                    is_enabled: true,
                    daily_kind: "Everyday".into(),
                    local_time: "22:00".into(),
                },
                retry: ScheduleRetry { is_enabled: true },
            },
        };

        let body = serde_json::to_value(&spec).unwrap();
        assert_eq!(body["type"], json!("CloudDirectorBackup"));
        assert_eq!(body["isHighPriority"], json!(false));
        assert_eq!(body["virtualMachines"]["includes"][0]["objectId"], json!("urn:vcloud:vm:1"));
        assert_eq!(body["virtualMachines"]["excludes"], json!({}));
        assert_eq!(body["storage"]["retentionPolicy"]["quantity"], json!(7));
        assert_eq!(body["schedule"]["daily"]["localTime"], json!("22:00"));
    }

    #[test]
    fn instant_recovery_keeps_the_odd_pascal_case_field() {
        let spec = InstantRecoverySpec {
            restore_point_id: "abc".into(),
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

        let body = serde_json::to_value(&spec).unwrap();
        assert_eq!(body["PowerUp"], json!(true));
        assert_eq!(body["nicsEnabled"], json!(false));
        assert_eq!(body["secureRestore"]["virusDetectionAction"], json!("DisableNetwork"));
    }
}
