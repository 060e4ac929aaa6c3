//! VDC listing and verification steps.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use vaultline_api::{DirectorApi, DirectorClient, VDCS_PATH};
use vaultline_types::{StepStatus, WorkflowLog, director::VdcSummary, log::CONTEXT_NONE};

use crate::{
    backup::paged_listing,
    context::{StepContext, decode_items, outputs},
    handler::{StepHandler, StepOutputs},
    keys,
};

/// `vdc:list`: first step of the backup flow: enumerate every VDC the
/// director session can see.
pub struct ListVdcs;

#[async_trait]
impl StepHandler for ListVdcs {
    fn name(&self) -> &'static str {
        "vdc:list"
    }

    fn summary(&self) -> &'static str {
        "List every VDC visible to the director session"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let client = director_from_inputs(ctx, CONTEXT_NONE)?;
        list_vdcs(&client, &mut ctx.log).await
    }
}

pub(crate) async fn list_vdcs(api: &dyn DirectorApi, log: &mut WorkflowLog) -> Result<StepOutputs> {
    let vdcs = paged_listing(api, VDCS_PATH, CONTEXT_NONE, "Get All VDCs", log).await?;
    let vdc_list: Vec<String> = decode_items::<VdcSummary>(vdcs).into_iter().filter_map(|vdc| vdc.name).collect();

    info!(count = vdc_list.len(), "director VDC listing complete");
    log.push(
        CONTEXT_NONE,
        "Get All VDCs",
        StepStatus::Success,
        format!("Retrieved {} VDCs: {:?}", vdc_list.len(), vdc_list),
    );
    Ok(outputs([(keys::VDC_LIST, json!(vdc_list))]))
}

/// `vdc:verify`: keep only the candidate VDC names that actually exist,
/// normalized to lower case for the downstream name matching.
pub struct VerifyVdcs;

#[async_trait]
impl StepHandler for VerifyVdcs {
    fn name(&self) -> &'static str {
        "vdc:verify"
    }

    fn summary(&self) -> &'static str {
        "Drop candidate VDC names the director does not know"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let candidates: Vec<String> = ctx.require_typed(keys::VDC_NAMES)?;
        if candidates.is_empty() {
            bail!("no VDC names provided for verification");
        }
        let client = director_from_inputs(ctx, CONTEXT_NONE)?;
        verify_vdcs(&client, candidates, &mut ctx.log).await
    }
}

pub(crate) async fn verify_vdcs(api: &dyn DirectorApi, candidates: Vec<String>, log: &mut WorkflowLog) -> Result<StepOutputs> {
    let vdcs = paged_listing(api, VDCS_PATH, CONTEXT_NONE, "Verify VDCs", log).await?;
    let existing: std::collections::HashSet<String> = decode_items::<VdcSummary>(vdcs)
        .into_iter()
        .filter_map(|vdc| vdc.name)
        .map(|name| name.to_lowercase())
        .collect();

    let valid: Vec<String> = candidates
        .iter()
        .map(|name| name.to_lowercase())
        .filter(|name| existing.contains(name))
        .collect();

    log.push(
        CONTEXT_NONE,
        "Verify VDCs",
        StepStatus::Success,
        format!("{} of {} candidate VDCs exist: {:?}", valid.len(), candidates.len(), valid),
    );
    Ok(outputs([(keys::VDC_LIST, json!(valid))]))
}

/// Build the director client from the step inputs, logging the token check
/// the way every director-facing step does.
pub(crate) fn director_from_inputs(ctx: &mut StepContext, context: &str) -> Result<DirectorClient> {
    let host = ctx.require_str(keys::DIRECTOR_HOST)?.to_string();
    let Some(token) = ctx.optional_str(keys::DIRECTOR_TOKEN).map(str::to_string) else {
        ctx.log.push(
            context,
            "Authenticate with cloud director",
            StepStatus::Failure,
            "No director token provided",
        );
        bail!("no director token provided");
    };
    ctx.log.push(
        context,
        "Authenticate with cloud director",
        StepStatus::Success,
        "Using provided director token",
    );
    Ok(DirectorClient::new(&host, &token)?)
}
