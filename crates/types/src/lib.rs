use std::{error::Error, str::FromStr};

pub mod director;
pub mod inventory;
pub mod log;
pub mod manager;
pub mod server;

pub use log::{StepRecord, StepStatus, WorkflowLog};

/// Identifies one of the vendor services a step handler talks to.
///
/// Two backup-platform generations coexist: the legacy session-token API
/// (`Manager`) and the modern bearer-token API (`BackupServer`). The
/// inventory source is the cloud director (`Director`). Header values and
/// default ports differ per service and are captured here so clients do not
/// scatter magic strings.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub enum ServiceKind {
    /// Cloud director inventory API (VDCs, compute policies, VMs).
    #[default]
    Director,
    /// Legacy backup-manager REST API, authenticated per session.
    Manager,
    /// Modern backup-server REST API, OAuth2 bearer tokens.
    BackupServer,
}

impl ServiceKind {
    /// Value of the `Accept` header sent on every request.
    pub fn accept_header(&self) -> &'static str {
        match self {
            Self::Director => "application/json;version=39.0",
            Self::Manager | Self::BackupServer => "application/json",
        }
    }

    /// Extra versioning header required by the modern backup API.
    pub fn api_version_header(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::BackupServer => Some(("x-api-version", "1.1-rev2")),
            _ => None,
        }
    }

    /// Name of the header that carries the caller-supplied token.
    ///
    /// `Director` and `BackupServer` expect `Authorization: Bearer <token>`;
    /// the legacy manager API uses its own session header.
    pub fn auth_header(&self) -> &'static str {
        match self {
            Self::Director | Self::BackupServer => "Authorization",
            Self::Manager => "X-RestSvcSessionId",
        }
    }

    /// Whether the token value must be prefixed with `Bearer `.
    pub fn bearer_scheme(&self) -> bool {
        matches!(self, Self::Director | Self::BackupServer)
    }

    /// Default HTTPS port the appliance listens on.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Director => 443,
            Self::Manager => 9398,
            Self::BackupServer => 9419,
        }
    }
}

impl FromStr for ServiceKind {
    type Err = ParseServiceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "director" => Ok(Self::Director),
            "manager" => Ok(Self::Manager),
            "server" => Ok(Self::BackupServer),
            _ => Err(ParseServiceKindError),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseServiceKindError;

impl std::fmt::Display for ParseServiceKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid service kind; expected 'director', 'manager' or 'server'")
    }
}

impl Error for ParseServiceKindError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_kind_headers_differ_per_generation() {
        assert_eq!(ServiceKind::Director.accept_header(), "application/json;version=39.0");
        assert_eq!(ServiceKind::Manager.auth_header(), "X-RestSvcSessionId");
        assert!(!ServiceKind::Manager.bearer_scheme());
        assert!(ServiceKind::BackupServer.bearer_scheme());
        assert_eq!(
            ServiceKind::BackupServer.api_version_header(),
            Some(("x-api-version", "1.1-rev2"))
        );
        assert_eq!(ServiceKind::Manager.api_version_header(), None);
    }

    #[test]
    fn service_kind_parses_cli_names() {
        assert_eq!("director".parse::<ServiceKind>().unwrap(), ServiceKind::Director);
        assert_eq!("server".parse::<ServiceKind>().unwrap(), ServiceKind::BackupServer);
        assert!("vbr".parse::<ServiceKind>().is_err());
    }
}
