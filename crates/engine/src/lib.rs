//! Workflow step handlers for VM backup and restore orchestration.
//!
//! Each handler is one step of a pipeline an external orchestration host
//! wires together: it receives a flat JSON object of inputs (carrying the
//! previous step's `workflow_logs`), talks to the cloud director and the two
//! backup-platform API generations, and returns an output mapping for the
//! next step. The handlers hold no state between invocations; everything a
//! step needs arrives in its inputs, and everything it learned leaves in its
//! outputs.
//!
//! [`handlers`] enumerates every registered step; [`find_handler`] is what
//! the CLI dispatches on.

pub mod backup;
mod clients;
pub mod context;
pub mod handler;
pub mod report;
pub mod restore;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use context::StepContext;
pub use handler::{StepHandler, StepOutputs};

/// Input/output key names of the host contract.
///
/// The casing is uneven because the keys predate this implementation: the
/// host's pipelines already pass `VDC_name`, `addedVMs` or `Restore_Results`
/// between steps, so the names are part of the external contract and must
/// not be normalized.
pub mod keys {
    /// The log accumulator threaded through every step.
    pub const WORKFLOW_LOGS: &str = "workflow_logs";

    // Service endpoints and caller-supplied tokens.
    pub const DIRECTOR_HOST: &str = "director_host";
    pub const DIRECTOR_TOKEN: &str = "director_token";
    pub const MANAGER_URL: &str = "manager_url";
    pub const MANAGER_TOKEN: &str = "manager_token";
    pub const SERVER_URL: &str = "server_url";
    pub const SERVER_TOKEN: &str = "server_token";

    // Inventory flow.
    pub const VDC_NAME: &str = "VDC_name";
    pub const VDC_NAMES: &str = "vdc_names";
    pub const VDC_LIST: &str = "vdc_list";
    pub const PVDC_NAME: &str = "PVDC_name";
    pub const VMS_LIST: &str = "vms_list";
    pub const VM_LABELS: &str = "vm_labels";
    pub const ADDED_VMS: &str = "addedVMs";
    pub const MISSING_VMS: &str = "missingVMs";
    pub const CHANGE_CODE: &str = "switch";
    pub const SNAPSHOT_DIR: &str = "snapshot_dir";

    // Backup job maintenance.
    pub const FILTERED_VMS: &str = "filtered_vms";
    pub const EXCLUDED_JOB_IDS: &str = "excluded_job_ids";
    pub const REPOSITORY_NAME: &str = "repository_name";
    pub const HIERARCHY_ROOT: &str = "hierarchy_root";
    pub const JOB_ID: &str = "job_id";
    pub const JOB_NAME: &str = "job_name";
    pub const MAX_RETRIES: &str = "max_retries";
    pub const RETRY_DELAY_SECS: &str = "retry_delay_secs";

    // Restore flow.
    pub const SELECTED_LABELS: &str = "selected_labels";
    pub const SELECTED_VMS: &str = "selected_vms";
    pub const RESTORE_DATE: &str = "RP_Date";
    pub const RESTORE_POINTS: &str = "restore_points";
    pub const UNPROTECTED_VMS: &str = "vms_without_restore_points";
    pub const RESTORE_RESULTS: &str = "Restore_Results";
    pub const RESTORE_TYPE: &str = "restore_type";
    pub const POWER_ON: &str = "PowerOn";

    // Session teardown.
    pub const SESSION_XML: &str = "contentAsString";

    // Log persistence and reports.
    pub const LOG_PATH: &str = "log_path";
    pub const REPORT_DIR: &str = "report_dir";
    pub const REPORT_PATH: &str = "report_path";
    pub const REPORT_CONTENT: &str = "report_content";
}

/// Every registered step handler, in pipeline order.
pub fn handlers() -> Vec<Box<dyn StepHandler>> {
    vec![
        // Backup flow.
        Box::new(backup::vdcs::ListVdcs),
        Box::new(backup::vdcs::VerifyVdcs),
        Box::new(backup::vms::ListVdcVms),
        Box::new(backup::vms::ListVmsAcrossVdcs),
        Box::new(backup::inventory::CompareInventory),
        Box::new(backup::filter::FilterProtectedVms),
        Box::new(backup::jobs::CreateBackupJob),
        Box::new(backup::jobs::FindJobId),
        Box::new(backup::jobs::AddVmsToJob),
        Box::new(backup::jobs::VerifyJobMembers),
        Box::new(backup::jobs::PruneJobMembers),
        // Restore flow.
        Box::new(restore::select::SelectVms),
        Box::new(restore::points::FetchRestorePoints),
        Box::new(restore::instant::InstantRecovery),
        Box::new(restore::full::FullRestore),
        // Session teardown.
        Box::new(session::LogoutDirector),
        Box::new(session::LogoutManager),
        Box::new(session::LogoutServer),
        // Logs and reports.
        Box::new(report::AppendLogs),
        Box::new(report::GenerateBackupReport),
        Box::new(report::GenerateRestoreReport),
    ]
}

/// Look a step handler up by its registered name.
pub fn find_handler(name: &str) -> Option<Box<dyn StepHandler>> {
    handlers().into_iter().find(|handler| handler.name() == name)
}
