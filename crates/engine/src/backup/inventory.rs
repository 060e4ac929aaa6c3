//! `inventory:compare`: diff the current VM listing against the stored
//! snapshot and classify the change for the host's branch node.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use vaultline_types::{StepStatus, WorkflowLog, inventory::VmRef};

use crate::{
    backup::snapshot::{Snapshot, SnapshotStore},
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

/// Branch code for the host: what changed since the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryDelta {
    /// Nothing changed.
    Unchanged,
    /// Every current VM is new (first run or full turnover).
    AllNew,
    /// Some VMs appeared and/or disappeared.
    Mixed,
    /// Only disappearances; nothing to add.
    MissingOnly,
}

impl InventoryDelta {
    /// The numeric code the host's branch node switches on.
    pub fn code(&self) -> i64 {
        match self {
            Self::Unchanged => 0,
            Self::AllNew => 1,
            Self::Mixed => -1,
            Self::MissingOnly => -2,
        }
    }
}

/// Pure diff: VMs present now but not before, and VMs that vanished.
pub fn diff_inventory(previous: &[VmRef], current: &[VmRef]) -> (Vec<VmRef>, Vec<VmRef>, InventoryDelta) {
    let previous_ids: std::collections::HashSet<&str> = previous.iter().map(|vm| vm.id.as_str()).collect();
    let current_ids: std::collections::HashSet<&str> = current.iter().map(|vm| vm.id.as_str()).collect();

    let added: Vec<VmRef> = current.iter().filter(|vm| !previous_ids.contains(vm.id.as_str())).cloned().collect();
    let missing: Vec<VmRef> = previous.iter().filter(|vm| !current_ids.contains(vm.id.as_str())).cloned().collect();

    let delta = match (added.is_empty(), missing.is_empty()) {
        (true, true) => InventoryDelta::Unchanged,
        (false, true) if added.len() == current.len() => InventoryDelta::AllNew,
        (true, false) => InventoryDelta::MissingOnly,
        _ => InventoryDelta::Mixed,
    };
    (added, missing, delta)
}

/// `inventory:compare` step handler.
pub struct CompareInventory;

#[async_trait]
impl StepHandler for CompareInventory {
    fn name(&self) -> &'static str {
        "inventory:compare"
    }

    fn summary(&self) -> &'static str {
        "Diff the current VM listing against the stored PVDC snapshot"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let vdc_name = ctx.require_str(keys::VDC_NAME)?.to_string();
        let pvdc_name = ctx.require_str(keys::PVDC_NAME)?.to_string();
        let current: Vec<VmRef> = ctx.require_typed(keys::VMS_LIST)?;
        let store = SnapshotStore::open(ctx.optional_str(keys::SNAPSHOT_DIR))?;
        compare_inventory(&store, &vdc_name, &pvdc_name, current, &mut ctx.log)
    }
}

pub(crate) fn compare_inventory(
    store: &SnapshotStore,
    vdc_name: &str,
    pvdc_name: &str,
    current: Vec<VmRef>,
    log: &mut WorkflowLog,
) -> Result<StepOutputs> {
    let snapshot = store.load(pvdc_name)?;
    match &snapshot {
        Snapshot::Missing => log.push(vdc_name, "Read Existing VMs", StepStatus::Success, "No existing VMs found (first run)"),
        Snapshot::Corrupt => log.push(
            vdc_name,
            "Read Existing VMs",
            StepStatus::Warning,
            "Stored snapshot did not parse, resetting to empty list",
        ),
        Snapshot::Loaded(vms) => log.push(
            vdc_name,
            "Read Existing VMs",
            StepStatus::Success,
            format!("Existing VMs read successfully, count: {}", vms.len()),
        ),
    }

    let (added, missing, delta) = diff_inventory(snapshot.vms(), &current);
    match delta {
        InventoryDelta::Unchanged => log.push(
            vdc_name,
            "Compare VMs",
            StepStatus::Success,
            "No new or missing VMs found, VMs match existing snapshot",
        ),
        InventoryDelta::AllNew => log.push(
            vdc_name,
            "Compare VMs",
            StepStatus::Success,
            format!("All VMs are new, count: {}", added.len()),
        ),
        InventoryDelta::MissingOnly => log.push(
            vdc_name,
            "Compare VMs",
            StepStatus::Warning,
            format!("Only missing VMs found, count: {}", missing.len()),
        ),
        InventoryDelta::Mixed => log.push(
            vdc_name,
            "Compare VMs",
            StepStatus::Success,
            format!("New VMs found: {}, missing VMs found: {}", added.len(), missing.len()),
        ),
    }
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|vm| vm.name.as_str()).collect();
        log.push(vdc_name, "Detect Missing VMs", StepStatus::Info, format!("Missing VMs: {names:?}"));
    }

    store.save(pvdc_name, &current)?;
    log.push(
        vdc_name,
        "Update Snapshot",
        StepStatus::Success,
        format!("Snapshot updated with current VM list, count: {}", current.len()),
    );

    Ok(outputs([
        (keys::ADDED_VMS, json!(added)),
        (keys::MISSING_VMS, json!(missing)),
        (keys::CHANGE_CODE, json!(delta.code())),
    ]))
}
