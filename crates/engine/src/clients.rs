//! Construction of vendor clients from host-supplied step inputs.

use anyhow::Result;
use vaultline_api::{BackupServerClient, ManagerClient};

use crate::{context::StepContext, keys};

/// Legacy manager client from `manager_url` + `manager_token`.
pub(crate) fn manager_from_inputs(ctx: &StepContext) -> Result<ManagerClient> {
    let base_url = ctx.require_str(keys::MANAGER_URL)?;
    let token = ctx.require_str(keys::MANAGER_TOKEN)?;
    Ok(ManagerClient::new(base_url, token)?)
}

/// Modern backup-server client from `server_url` + `server_token`.
pub(crate) fn server_from_inputs(ctx: &StepContext) -> Result<BackupServerClient> {
    let base_url = ctx.require_str(keys::SERVER_URL)?;
    let token = ctx.require_str(keys::SERVER_TOKEN)?;
    Ok(BackupServerClient::new(base_url, token)?)
}
