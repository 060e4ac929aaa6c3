//! Name-matching rules joining director inventory to backup entities.
//!
//! Nothing in either vendor API links a VDC to its backup job or a VM to
//! its backup directly; the operators encode the relationships in names:
//!
//! - a VDC's default compute policy has a description matching
//!   `^<vdc>.*defaultpolicy$`;
//! - the per-VDC job is named `<vdc>_Standard`;
//! - a backup is named `"<job name> - <vm name>-<suffix>"`;
//! - a job member's hierarchy reference is
//!   `urn:vCloud:Vm:<root-uuid>.<vm-urn>`.
//!
//! All comparisons are case-insensitive because the operators type the VDC
//! names by hand.

use regex::{Regex, RegexBuilder};

/// Suffix that marks a compute policy as a PVDC default policy.
const DEFAULT_POLICY_SUFFIX: &str = "defaultpolicy";
/// Suffix of the per-VDC standard backup job name.
const STANDARD_JOB_SUFFIX: &str = "_standard";

/// Compile the anchored default-policy pattern for a VDC name.
pub fn default_policy_pattern(vdc_name: &str) -> Regex {
    let pattern = format!("^{}.*{}$", regex::escape(&vdc_name.to_lowercase()), DEFAULT_POLICY_SUFFIX);
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .expect("escaped vdc name always forms a valid pattern")
}

/// Whether a policy description marks any PVDC default policy.
pub fn is_default_policy(description: &str) -> bool {
    description.to_lowercase().ends_with(DEFAULT_POLICY_SUFFIX)
}

/// Canonical name of the standard backup job for a VDC.
pub fn standard_job_name(vdc_name: &str) -> String {
    format!("{vdc_name}_Standard")
}

/// Whether `job_name` is the standard job for `vdc_name`.
pub fn is_standard_job_for(job_name: &str, vdc_name: &str) -> bool {
    job_name.to_lowercase() == format!("{}{}", vdc_name.to_lowercase(), STANDARD_JOB_SUFFIX)
}

/// Whether `job_name` is any VDC's standard job.
pub fn has_standard_job_suffix(job_name: &str) -> bool {
    job_name.to_lowercase().ends_with(STANDARD_JOB_SUFFIX)
}

/// Split a backup name into its job name and VM part.
///
/// Backups without the `" - "` separator belong to job types this pipeline
/// does not manage and are skipped.
pub fn split_backup_name(backup_name: &str) -> Option<(&str, &str)> {
    backup_name.split_once(" - ")
}

/// Strip the generated `-<suffix>` tail from a backup's VM part.
///
/// `"web-01-vm42"` yields `"web-01"`; a part without `-` is returned as is.
pub fn vm_base_name(vm_part: &str) -> &str {
    match vm_part.rsplit_once('-') {
        Some((base, _suffix)) => base.trim(),
        None => vm_part.trim(),
    }
}

/// Compose the hierarchy reference for adding a VM to a job.
///
/// Only the uuid tail of the root's urn participates in the reference.
pub fn compose_hierarchy_ref(hierarchy_root_uid: &str, vm_id: &str) -> String {
    format!("urn:vCloud:Vm:{}.{}", urn_tail(hierarchy_root_uid), vm_id)
}

/// Extract the director VM urn from a job member's hierarchy reference.
///
/// The reference is `urn:vCloud:Vm:<root-uuid>.<vm-urn>`; everything after
/// the first `.` is the VM urn. References without a `.` yield `None`.
pub fn vm_urn_from_hierarchy_ref(hierarchy_obj_ref: &str) -> Option<&str> {
    hierarchy_obj_ref.split_once('.').map(|(_, vm_urn)| vm_urn)
}

/// The uuid segment after the last `:` of a urn.
pub fn urn_tail(urn: &str) -> &str {
    urn.rsplit(':').next().unwrap_or(urn)
}
