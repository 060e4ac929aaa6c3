//! Run-log persistence and markdown report rendering.
//!
//! The orchestration host stores nothing between pipelines, so the final
//! backup steps append the run's records to a JSON log file and the report
//! steps turn the accumulated records into operator-facing markdown. Path
//! resolution mirrors the snapshot store: explicit input, then environment
//! variable, then the user config dir.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::warn;
use vaultline_types::{
    StepRecord, StepStatus, WorkflowLog,
    inventory::{UnprotectedVm, VdcVm},
    log::{CONTEXT_ALL_VDCS, CONTEXT_ALL_VMS, CONTEXT_NONE, report_timestamp},
};
use vaultline_util::date_handling::{report_date, report_file_stamp};

use crate::{
    backup::snapshot::default_artifact_dir,
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

/// Environment variable overriding the workflow log file path.
pub const LOG_PATH_ENV: &str = "VAULTLINE_LOG_PATH";
const LOG_FILE_NAME: &str = "backup_workflow_logs.json";

fn resolve_log_path(path_override: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = path_override.filter(|path| !path.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Ok(path) = env::var(LOG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    default_artifact_dir()
        .map(|dir| dir.join(LOG_FILE_NAME))
        .with_context(|| format!("no log file location available; set {LOG_PATH_ENV}"))
}

fn resolve_report_dir(dir_override: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = dir_override.filter(|dir| !dir.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    default_artifact_dir()
        .map(|dir| dir.join("reports"))
        .context("no report directory available")
}

/// `logs:append`: persist this run's records to the shared log file.
pub struct AppendLogs;

#[async_trait]
impl StepHandler for AppendLogs {
    fn name(&self) -> &'static str {
        "logs:append"
    }

    fn summary(&self) -> &'static str {
        "Append the run's workflow log to the persistent log file"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let path = resolve_log_path(ctx.optional_str(keys::LOG_PATH))?;
        match append_records(&path, ctx.log.records()) {
            Ok(total) => {
                ctx.log.push(
                    CONTEXT_NONE,
                    "Write Workflow Logs",
                    StepStatus::Success,
                    format!("Log file {} now holds {total} records", path.display()),
                );
                Ok(outputs([(keys::LOG_PATH, json!(path.display().to_string()))]))
            }
            Err(error) => {
                ctx.log.push(
                    CONTEXT_NONE,
                    "Write Workflow Logs",
                    StepStatus::Failure,
                    format!("Failed to write {}: {error}", path.display()),
                );
                Err(error)
            }
        }
    }
}

/// Append records to the log file, returning the new total.
///
/// An unparseable existing file is reset rather than treated as fatal; the
/// log is an operator convenience and must never block the pipeline's
/// closing steps.
pub(crate) fn append_records(path: &Path, records: &[StepRecord]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut all: Vec<StepRecord> = match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
            warn!(path = %path.display(), %error, "existing log file did not parse; resetting");
            Vec::new()
        }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(error) => return Err(error.into()),
    };
    all.extend(records.iter().cloned());
    fs::write(path, serde_json::to_string_pretty(&all)?)?;
    Ok(all.len())
}

/// `report:backup`: render today's backup activity from the log file.
pub struct GenerateBackupReport;

#[async_trait]
impl StepHandler for GenerateBackupReport {
    fn name(&self) -> &'static str {
        "report:backup"
    }

    fn summary(&self) -> &'static str {
        "Render today's backup workflow report from the log file"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let log_path = resolve_log_path(ctx.optional_str(keys::LOG_PATH))?;
        let report_dir = resolve_report_dir(ctx.optional_str(keys::REPORT_DIR))?;
        generate_backup_report(&log_path, &report_dir, &mut ctx.log)
    }
}

pub(crate) fn generate_backup_report(log_path: &Path, report_dir: &Path, log: &mut WorkflowLog) -> Result<StepOutputs> {
    let records = match read_log_file(log_path) {
        Ok(records) => records,
        Err(error) => {
            log.push(CONTEXT_NONE, "Read Workflow Logs", StepStatus::Failure, error.to_string());
            return Err(error);
        }
    };
    log.push(
        CONTEXT_NONE,
        "Read Workflow Logs",
        StepStatus::Success,
        format!("Read {} records from {}", records.len(), log_path.display()),
    );

    // Reports cover one calendar day on the operators' report clock; the
    // record stamps share that clock, so a prefix match is exact.
    let today = report_date().to_string();
    let todays: Vec<&StepRecord> = records.iter().filter(|record| record.timestamp.starts_with(&today)).collect();

    let report = render_backup_report(&todays);
    let path = report_dir.join(format!("{today}_backup_workflow_report.md"));
    write_report(&path, &report)?;
    log.push(
        CONTEXT_NONE,
        "Write Backup Report",
        StepStatus::Success,
        format!("Report written to {}", path.display()),
    );

    Ok(outputs([
        (keys::REPORT_PATH, json!(path.display().to_string())),
        (keys::REPORT_CONTENT, json!(report)),
    ]))
}

fn read_log_file(path: &Path) -> Result<Vec<StepRecord>> {
    let content = fs::read_to_string(path).with_context(|| format!("log file {} not readable", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("log file {} did not parse", path.display()))
}

fn write_report(path: &Path, report: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, report).with_context(|| format!("failed to write report {}", path.display()))
}

fn render_backup_report(records: &[&StepRecord]) -> String {
    let mut by_vdc: IndexMap<&str, Vec<&StepRecord>> = IndexMap::new();
    let mut total_steps = 0usize;
    for &record in records {
        if record.context != CONTEXT_NONE {
            total_steps += 1;
        }
        by_vdc.entry(record.context.as_str()).or_default().push(record);
    }

    let mut successful = 0.0f64;
    let mut vdc_count = 0usize;
    let mut vms_backed_up = 0usize;
    for (vdc, entries) in &by_vdc {
        if *vdc == CONTEXT_NONE {
            continue;
        }
        vdc_count += 1;
        for record in entries {
            match record.status {
                StepStatus::Success => successful += 1.0,
                // Half credit, so a partially filled job drags the rate.
                StepStatus::PartialSuccess => successful += 0.5,
                _ => {}
            }
            if record.step == "Add VMs to Job"
                && record.status == StepStatus::Success
                && let Some(added) = record.details.get("vms_added").and_then(Value::as_array)
            {
                vms_backed_up += added.len();
            }
        }
    }
    let success_rate = if total_steps > 0 { successful / total_steps as f64 * 100.0 } else { 0.0 };

    let mut lines: Vec<String> = vec![
        "# Automated VM Backup Workflow Report".into(),
        format!("**Generated on:** {}", report_timestamp()),
        String::new(),
        "## Summary".into(),
        format!("- **Success Rate:** {success_rate:.2}%"),
        format!("- **VDCs Processed:** {vdc_count}"),
        format!("- **VMs Backed Up:** {vms_backed_up}"),
        "## Detailed Report by VDC".into(),
    ];
    for (vdc, entries) in &by_vdc {
        if *vdc == CONTEXT_NONE {
            continue;
        }
        lines.push(format!("### VDC: {vdc}"));
        lines.push("#### Steps:".into());
        for record in entries {
            lines.push(format!("- **Step:** {}", record.step));
            lines.push(format!("  - **Timestamp:** {}", record.timestamp));
            lines.push(format!("  - **Status:** {}", record.status));
            match &record.details {
                Value::Object(map) => {
                    for (key, value) in map {
                        lines.push(format!("  - **{key}:** {value}"));
                    }
                }
                other => lines.push(format!("  - **Details:** {}", detail_text(other))),
            }
            lines.push(String::new());
        }
    }
    lines.join("\n")
}

fn detail_text(details: &Value) -> String {
    match details {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `report:restore`: render the restore run's report from this pipeline's
/// own records.
pub struct GenerateRestoreReport;

#[async_trait]
impl StepHandler for GenerateRestoreReport {
    fn name(&self) -> &'static str {
        "report:restore"
    }

    fn summary(&self) -> &'static str {
        "Render the restore workflow report for this run"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let selected: Vec<VdcVm> = ctx.require_typed(keys::SELECTED_VMS)?;
        let unprotected: Vec<UnprotectedVm> = ctx.optional_typed(keys::UNPROTECTED_VMS)?.unwrap_or_default();
        let restore_type = ctx.require_str(keys::RESTORE_TYPE)?.to_string();
        let report_dir = resolve_report_dir(ctx.optional_str(keys::REPORT_DIR))?;

        let report = render_restore_report(ctx.log.records(), &selected, &unprotected, &restore_type);
        let path = report_dir.join(format!("restore_workflow_report_{}.md", report_file_stamp()));
        write_report(&path, &report)?;
        ctx.log.push(
            CONTEXT_ALL_VDCS,
            "Write Restore Report",
            StepStatus::Success,
            format!("Report written to {}", path.display()),
        );

        Ok(outputs([
            (keys::REPORT_PATH, json!(path.display().to_string())),
            (keys::REPORT_CONTENT, json!(report)),
        ]))
    }
}

fn render_restore_report(records: &[StepRecord], selected: &[VdcVm], unprotected: &[UnprotectedVm], restore_type: &str) -> String {
    let vm_vdc: HashMap<&str, &str> = selected.iter().map(|vm| (vm.name.as_str(), vm.vdc.as_str())).collect();

    // Records are tagged with either a VM name or a VDC name; the VM→VDC
    // mapping folds the former into the latter for grouping.
    let mut by_vdc: IndexMap<&str, Vec<&StepRecord>> = IndexMap::new();
    let mut vms_processed = 0usize;
    for record in records {
        let vm_match = vm_vdc.get(record.context.as_str()).copied();
        let vdc = match vm_match {
            Some(vdc) => vdc,
            None if record.context != CONTEXT_ALL_VMS && record.context != CONTEXT_ALL_VDCS => record.context.as_str(),
            None => CONTEXT_NONE,
        };
        if vm_match.is_some() && matches!(record.step.as_str(), "Start Restore" | "Start Instant Recovery") {
            vms_processed += 1;
        }
        by_vdc.entry(vdc).or_default().push(record);
    }

    let detail_step = match restore_type {
        "Full VM Restore" => Some("Perform Restore"),
        "Instant Recovery" => Some("Perform Instant Recovery"),
        _ => None,
    };

    let mut lines: Vec<String> = vec![
        "# Automated VM Restore Workflow Report".into(),
        format!("**Generated on:** {}", report_timestamp()),
        String::new(),
        "## Summary".into(),
        format!("- **Restore Type:** {restore_type}"),
        format!("- **VDCs Processed:** {}", by_vdc.keys().filter(|vdc| **vdc != CONTEXT_NONE).count()),
        format!("- **Total VMs Processed:** {vms_processed}"),
        format!("- **VMs Without Restore Points:** {}", unprotected.len()),
        "## Detailed Report by VDC".into(),
    ];
    for (vdc, entries) in &by_vdc {
        if *vdc == CONTEXT_NONE {
            continue;
        }
        lines.push(format!("### VDC: {vdc}"));
        lines.push("#### Restore Operations:".into());
        for record in entries {
            if !vm_vdc.contains_key(record.context.as_str()) || detail_step != Some(record.step.as_str()) {
                continue;
            }
            lines.push(format!("- **VM:** {}", record.context));
            lines.push(format!("  - **Step:** {}", record.step));
            lines.push(format!("  - **Timestamp:** {}", record.timestamp));
            lines.push(format!("  - **Status:** {}", record.status));
            lines.push(format!("  - **Details:** {}", detail_text(&record.details)));
            lines.push(String::new());
        }

        let without: Vec<String> = unprotected
            .iter()
            .filter(|vm| vm.vdc == *vdc)
            .map(|vm| format!("- {} on {} with id {}", vm.vm_name, vm.vdc, vm.vm_id))
            .collect();
        if !without.is_empty() {
            lines.push("#### VMs Without Restore Points:".into());
            lines.extend(without);
            lines.push(String::new());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(context: &str, step: &str, status: StepStatus, details: Value) -> StepRecord {
        StepRecord::new(context, step, status, details)
    }

    #[test]
    fn append_accumulates_and_tolerates_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.json");

        let first = vec![record("vdc-a", "Fetch VMs", StepStatus::Success, json!("ok"))];
        assert_eq!(append_records(&path, &first).unwrap(), 1);
        assert_eq!(append_records(&path, &first).unwrap(), 2);

        fs::write(&path, "{broken").unwrap();
        assert_eq!(append_records(&path, &first).unwrap(), 1);
        let reread: Vec<StepRecord> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread.len(), 1);
    }

    #[tokio::test]
    async fn append_handler_reports_the_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        let mut ctx = StepContext::new(
            json!({
                "log_path": path.to_str().unwrap(),
                "workflow_logs": [{
                    "timestamp": "2025-05-02T10:00:00",
                    "context": "vdc-a",
                    "step": "Fetch VMs",
                    "status": "success",
                    "details": "ok"
                }]
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        let out = AppendLogs.run(&mut ctx).await.unwrap();
        assert_eq!(out[keys::LOG_PATH], json!(path.to_str().unwrap()));
        assert_eq!(ctx.log.records().last().unwrap().step, "Write Workflow Logs");
        let stored: Vec<StepRecord> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn backup_report_filters_today_and_counts_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs.json");
        let report_dir = dir.path().join("reports");

        let mut stale = record("vdc-old", "Fetch VMs", StepStatus::Success, json!("ok"));
        stale.timestamp = "2020-01-01T00:00:00".into();
        let records = vec![
            stale,
            record("N/A", "Get All VDCs", StepStatus::Success, json!("Retrieved 2 VDCs")),
            record("vdc-a", "Fetch VMs", StepStatus::Success, json!("ok")),
            record(
                "vdc-a",
                "Add VMs to Job",
                StepStatus::Success,
                json!({"total_vms_processed": 2, "vms_added": ["web-01", "db-01"], "vms_failed": []}),
            ),
            record("vdc-b", "Create Backup Job", StepStatus::PartialSuccess, json!("half done")),
        ];
        fs::write(&log_path, serde_json::to_string_pretty(&records).unwrap()).unwrap();

        let mut log = WorkflowLog::new();
        let out = generate_backup_report(&log_path, &report_dir, &mut log).unwrap();
        let report = out[keys::REPORT_CONTENT].as_str().unwrap();

        assert!(report.contains("- **VDCs Processed:** 2"));
        assert!(report.contains("- **VMs Backed Up:** 2"));
        // 3 counted steps: success + success + partial = 2.5 of 3.
        assert!(report.contains("- **Success Rate:** 83.33%"));
        assert!(report.contains("### VDC: vdc-a"));
        assert!(!report.contains("vdc-old"));
        assert!(!report.contains("### VDC: N/A"));
        assert!(report.contains("- **vms_added:** [\"web-01\",\"db-01\"]"));

        let path = out[keys::REPORT_PATH].as_str().unwrap();
        assert!(fs::read_to_string(path).unwrap().contains("# Automated VM Backup Workflow Report"));
    }

    #[test]
    fn missing_log_file_fails_with_a_failure_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = WorkflowLog::new();

        let result = generate_backup_report(&dir.path().join("absent.json"), dir.path(), &mut log);
        assert!(result.is_err());
        assert_eq!(log.records().last().unwrap().status, StepStatus::Failure);
    }

    #[test]
    fn restore_report_groups_vm_records_under_their_vdc() {
        let selected = vec![
            VdcVm {
                name: "web-01".into(),
                id: "urn:vm:1".into(),
                vdc: "vdc-a".into(),
            },
            VdcVm {
                name: "db-01".into(),
                id: "urn:vm:2".into(),
                vdc: "vdc-b".into(),
            },
        ];
        let unprotected = vec![UnprotectedVm {
            vm_name: "ghost".into(),
            vm_id: "urn:vm:9".into(),
            vdc: "vdc-a".into(),
        }];
        let records = vec![
            record(CONTEXT_ALL_VMS, "Fetch Backups", StepStatus::Success, json!("ok")),
            record("web-01", "Start Instant Recovery", StepStatus::Info, json!("starting")),
            record("web-01", "Perform Instant Recovery", StepStatus::Success, json!("Successfully started")),
            record("db-01", "Start Instant Recovery", StepStatus::Info, json!("starting")),
            record("db-01", "Perform Instant Recovery", StepStatus::Failure, json!("Failed to start")),
        ];

        let report = render_restore_report(&records, &selected, &unprotected, "Instant Recovery");
        assert!(report.contains("- **Restore Type:** Instant Recovery"));
        assert!(report.contains("- **VDCs Processed:** 2"));
        assert!(report.contains("- **Total VMs Processed:** 2"));
        assert!(report.contains("- **VMs Without Restore Points:** 1"));
        assert!(report.contains("### VDC: vdc-a"));
        assert!(report.contains("- **VM:** web-01"));
        assert!(report.contains("- ghost on vdc-a with id urn:vm:9"));
        // Full-restore records would be filtered under this restore type.
        assert!(!report.contains("Perform Restore\n"));
    }

    #[test]
    fn restore_report_only_details_steps_matching_the_restore_type() {
        let selected = vec![VdcVm {
            name: "web-01".into(),
            id: "urn:vm:1".into(),
            vdc: "vdc-a".into(),
        }];
        let records = vec![
            record("web-01", "Start Restore", StepStatus::Info, json!("starting")),
            record("web-01", "Perform Restore", StepStatus::Success, json!("Restore started")),
        ];

        let full = render_restore_report(&records, &selected, &[], "Full VM Restore");
        assert!(full.contains("- **VM:** web-01"));

        let instant = render_restore_report(&records, &selected, &[], "Instant Recovery");
        assert!(!instant.contains("- **VM:** web-01"));
    }
}
