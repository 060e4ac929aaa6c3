//! Steps of the automated VM restore flow.
//!
//! The host wires these after the cross-VDC inventory step: the operator's
//! VM selection is resolved, each VM is joined to its backup by name, a
//! restore point is picked per VM (latest, or a requested calendar day),
//! and the recovery is triggered either as an instant recovery on the
//! modern API or a full restore on the legacy one.

pub mod full;
pub mod instant;
pub mod points;
pub mod select;

use vaultline_api::ApiError;

/// Outcome label for a failed trigger, mirroring the status tag the
/// downstream report step expects (`"Failed: <http status>"`).
pub(crate) fn failure_status(error: &ApiError) -> String {
    match error {
        ApiError::Status { status, .. } => format!("Failed: {status}"),
        _ => "Failed: no response".to_string(),
    }
}
