//! `vm:select`: resolve the operator's `"<vm> on <vdc>"` selections
//! against the aggregated inventory.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use vaultline_types::{StepStatus, inventory::VdcVm, log::CONTEXT_ALL_VDCS};

use crate::{
    context::{StepContext, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

pub struct SelectVms;

#[async_trait]
impl StepHandler for SelectVms {
    fn name(&self) -> &'static str {
        "vm:select"
    }

    fn summary(&self) -> &'static str {
        "Resolve the operator's VM selections against the inventory"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let inventory: Vec<VdcVm> = ctx.require_typed(keys::VMS_LIST)?;
        let selections: Vec<String> = ctx.require_typed(keys::SELECTED_LABELS)?;

        let lookup: HashMap<(String, String), &VdcVm> = inventory
            .iter()
            .map(|vm| ((vm.name.clone(), vm.vdc.clone()), vm))
            .collect();

        let mut selected: Vec<VdcVm> = Vec::new();
        for label in &selections {
            let Some((name, vdc)) = label.split_once(" on ") else {
                warn!(%label, "selection label has no ' on ' separator");
                ctx.log.push(
                    CONTEXT_ALL_VDCS,
                    "Select VMs",
                    StepStatus::Warning,
                    format!("Malformed selection '{label}'"),
                );
                continue;
            };
            match lookup.get(&(name.to_string(), vdc.to_string())) {
                Some(vm) => selected.push((*vm).clone()),
                None => {
                    ctx.log.push(
                        vdc,
                        "Select VMs",
                        StepStatus::Warning,
                        format!("Selected VM '{label}' not found in inventory"),
                    );
                }
            }
        }

        let vdcs: BTreeSet<&str> = selected.iter().map(|vm| vm.vdc.as_str()).collect();
        for vdc in vdcs {
            ctx.log
                .push(vdc, "Select VMs", StepStatus::Success, format!("VMs selected in VDC: {vdc}"));
        }
        ctx.log.push(
            CONTEXT_ALL_VDCS,
            "Select VMs",
            StepStatus::Success,
            format!("Selected {} out of {} VMs", selected.len(), selections.len()),
        );

        Ok(outputs([(keys::SELECTED_VMS, json!(selected))]))
    }
}
