//! VM inventory steps, driven through VDC default compute policies.
//!
//! The director offers no direct "VMs of this VDC" listing usable with the
//! tenant-wide session, so the flow goes through the VDC's default compute
//! policy: match the policy by its description, then list the policy's VMs.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use vaultline_api::{COMPUTE_POLICIES_PATH, DirectorApi, policy_vdcs_path, policy_vms_path};
use vaultline_types::{
    StepStatus, WorkflowLog,
    director::{ComputePolicy, PolicyVdc, PolicyVm},
    inventory::{VdcVm, VmRef},
    log::CONTEXT_ALL_VDCS,
};
use vaultline_util::matching::{default_policy_pattern, is_default_policy};

use crate::{
    backup::{paged_listing, vdcs::director_from_inputs},
    context::{StepContext, decode_items, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

/// `vm:list`: inventory the VMs of one VDC for the backup flow.
pub struct ListVdcVms;

#[async_trait]
impl StepHandler for ListVdcVms {
    fn name(&self) -> &'static str {
        "vm:list"
    }

    fn summary(&self) -> &'static str {
        "List the VMs of one VDC through its default compute policy"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let client = director_from_inputs(ctx, &vdc_name)?;
        list_vdc_vms(&client, &vdc_name, &mut ctx.log).await
    }
}

pub(crate) async fn list_vdc_vms(api: &dyn DirectorApi, vdc_name: &str, log: &mut WorkflowLog) -> Result<StepOutputs> {
    let policies = paged_listing(api, COMPUTE_POLICIES_PATH, vdc_name, "Fetch Compute Policies", log).await?;
    let policies: Vec<ComputePolicy> = decode_items(policies);

    let Some((policy_id, pvdc_name)) = find_default_policy(api, &policies, vdc_name, log).await else {
        let message = format!("No compute policy ending with 'defaultpolicy' found for VDC {vdc_name}");
        log.push(vdc_name, "Find PVDC Compute Policy", StepStatus::Failure, message.clone());
        bail!(message);
    };

    let vms = paged_listing(api, &policy_vms_path(&policy_id), vdc_name, "Fetch All VMs", log).await?;
    let vm_list: Vec<VmRef> = decode_items::<PolicyVm>(vms)
        .into_iter()
        .map(|vm| VmRef { name: vm.name, id: vm.id })
        .collect();

    if vm_list.is_empty() {
        log.push(vdc_name, "Get All VMs", StepStatus::Success, "No VMs found in VDC");
    } else {
        log.push(
            vdc_name,
            "Get All VMs",
            StepStatus::Success,
            format!("Retrieved {} VMs for VDC {vdc_name}", vm_list.len()),
        );
    }

    Ok(outputs([
        (keys::VMS_LIST, json!(vm_list)),
        (keys::PVDC_NAME, json!(pvdc_name)),
        (keys::VDC_NAME, json!(vdc_name)),
    ]))
}

/// `vm:list-across`: aggregate the VMs of several VDCs for the restore
/// flow, tagging each VM with its VDC and producing the operator-facing
/// selection labels.
pub struct ListVmsAcrossVdcs;

#[async_trait]
impl StepHandler for ListVmsAcrossVdcs {
    fn name(&self) -> &'static str {
        "vm:list-across"
    }

    fn summary(&self) -> &'static str {
        "Aggregate VM inventories across the selected VDCs"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_names: Vec<String> = ctx.require_typed(keys::VDC_LIST)?;
        let client = director_from_inputs(ctx, CONTEXT_ALL_VDCS)?;
        list_vms_across(&client, &vdc_names, &mut ctx.log).await
    }
}

pub(crate) async fn list_vms_across(api: &dyn DirectorApi, vdc_names: &[String], log: &mut WorkflowLog) -> Result<StepOutputs> {
    let policies = paged_listing(api, COMPUTE_POLICIES_PATH, CONTEXT_ALL_VDCS, "Fetch Compute Policies", log).await?;
    let policies: Vec<ComputePolicy> = decode_items(policies);

    let mut matched: Vec<(String, String)> = Vec::new();
    for vdc_name in vdc_names {
        match find_default_policy(api, &policies, vdc_name, log).await {
            Some((policy_id, _pvdc_name)) => matched.push((vdc_name.clone(), policy_id)),
            None => {
                warn!(vdc = %vdc_name, "no default compute policy matched");
                log.push(
                    vdc_name.clone(),
                    "Find PVDC Compute Policy",
                    StepStatus::Warning,
                    format!("No compute policy found for VDC {vdc_name}"),
                );
            }
        }
    }

    if matched.is_empty() {
        log.push(
            CONTEXT_ALL_VDCS,
            "Match VDCs",
            StepStatus::Warning,
            format!("No VDCs matched from input: {vdc_names:?}"),
        );
        return Ok(outputs([(keys::VMS_LIST, json!([])), (keys::VM_LABELS, json!([]))]));
    }

    let mut vm_list: Vec<VdcVm> = Vec::new();
    for (vdc_name, policy_id) in &matched {
        let vms = paged_listing(api, &policy_vms_path(policy_id), vdc_name, "Fetch All VMs", log).await?;
        vm_list.extend(decode_items::<PolicyVm>(vms).into_iter().map(|vm| VdcVm {
            name: vm.name,
            id: vm.id,
            vdc: vdc_name.clone(),
        }));
    }

    let labels: Vec<String> = vm_list.iter().map(VdcVm::display_label).collect();
    log.push(
        CONTEXT_ALL_VDCS,
        "Fetch VMs",
        StepStatus::Success,
        format!("Retrieved {} VMs from {} VDCs", vm_list.len(), matched.len()),
    );

    Ok(outputs([(keys::VMS_LIST, json!(vm_list)), (keys::VM_LABELS, json!(labels))]))
}

/// Resolve a VDC's default compute policy.
///
/// First pass matches the policy description against the
/// `^<vdc>.*defaultpolicy$` convention; when naming drifted, the second pass
/// walks every default policy's VDC associations instead.
pub(crate) async fn find_default_policy(
    api: &dyn DirectorApi,
    policies: &[ComputePolicy],
    vdc_name: &str,
    log: &mut WorkflowLog,
) -> Option<(String, String)> {
    let pattern = default_policy_pattern(vdc_name);
    for policy in policies {
        let Some(description) = policy.description.as_deref() else {
            continue;
        };
        if pattern.is_match(description) {
            log.push(
                vdc_name,
                "Find PVDC Compute Policy",
                StepStatus::Success,
                format!("Matched compute policy '{description}' (ID: {}) by name pattern", policy.id),
            );
            return Some((policy.id.clone(), description.to_string()));
        }
    }

    for policy in policies {
        let Some(description) = policy.description.as_deref() else {
            continue;
        };
        if !is_default_policy(description) {
            continue;
        }
        let associated = match api.get_list(&policy_vdcs_path(&policy.id)).await {
            Ok(items) => items,
            Err(error) => {
                log.push(
                    vdc_name,
                    "Fetch VDCs for Compute Policy",
                    StepStatus::Warning,
                    format!("Failed to get VDCs for policy {description}: {error}"),
                );
                continue;
            }
        };
        let owns_vdc = decode_items::<PolicyVdc>(associated)
            .into_iter()
            .filter_map(|vdc| vdc.name)
            .any(|name| name.eq_ignore_ascii_case(vdc_name));
        if owns_vdc {
            log.push(
                vdc_name,
                "Find PVDC Compute Policy",
                StepStatus::Success,
                format!("Matched compute policy '{description}' (ID: {}) via VDC association", policy.id),
            );
            return Some((policy.id.clone(), description.to_string()));
        }
    }

    info!(vdc = %vdc_name, "no default compute policy found");
    None
}
