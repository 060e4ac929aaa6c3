//! Steps of the automated VM backup flow.
//!
//! The flow the host wires together: list VDCs, inventory each VDC's VMs
//! through its default compute policy, diff against the stored snapshot,
//! drop VMs already protected elsewhere, then create or maintain the VDC's
//! standard backup job.

use anyhow::Result;
use serde_json::Value;
use vaultline_api::{DirectorApi, fetch_all_pages};
use vaultline_types::{StepStatus, WorkflowLog};

pub mod filter;
pub mod inventory;
pub mod jobs;
pub mod snapshot;
pub mod vdcs;
pub mod vms;

/// Accumulate a paged director listing, logging per-page progress and a
/// failure record before propagating any page error.
pub(crate) async fn paged_listing(
    api: &dyn DirectorApi,
    path: &str,
    context: &str,
    step: &str,
    log: &mut WorkflowLog,
) -> Result<Vec<Value>> {
    let result = fetch_all_pages(api, path, |page, fetched, total| {
        log.push(
            context,
            step,
            StepStatus::Success,
            format!("Fetched {fetched} items on page {page}, total so far: {total}"),
        );
    })
    .await;

    match result {
        Ok(items) => Ok(items),
        Err(error) => {
            log.push(context, step, StepStatus::Failure, format!("Failed to fetch data: {error}"));
            Err(error.into())
        }
    }
}
