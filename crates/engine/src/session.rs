//! Session teardown steps.
//!
//! Tokens are caller-supplied, but two of the three services keep
//! server-side session state that outlives the token holder: the director
//! session is deleted through the token itself, while the legacy manager
//! needs the `SessionId` of the login response, which the host hands the
//! final step as the raw XML body it captured at login time.

use anyhow::{Result, bail};
use async_trait::async_trait;
use vaultline_api::{BackupServerApi, DirectorApi, ManagerApi};
use vaultline_types::{
    StepStatus, WorkflowLog,
    log::{CONTEXT_ALL_VMS, CONTEXT_NONE},
};

use crate::{
    backup::vdcs::director_from_inputs,
    clients::{manager_from_inputs, server_from_inputs},
    context::StepContext,
    handler::{StepHandler, StepOutputs},
    keys,
};

/// `session:logout-director`: delete the current director session.
pub struct LogoutDirector;

#[async_trait]
impl StepHandler for LogoutDirector {
    fn name(&self) -> &'static str {
        "session:logout-director"
    }

    fn summary(&self) -> &'static str {
        "Delete the current cloud director session"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let context = ctx.optional_str(keys::VDC_NAME).unwrap_or(CONTEXT_NONE).to_string();
        let client = director_from_inputs(ctx, &context)?;
        logout_director(&client, &context, &mut ctx.log).await
    }
}

pub(crate) async fn logout_director(api: &dyn DirectorApi, context: &str, log: &mut WorkflowLog) -> Result<StepOutputs> {
    match api.logout().await {
        Ok(()) => {
            log.push(
                context,
                "Logout from Cloud Director",
                StepStatus::Success,
                "Successfully logged out from the cloud director",
            );
            Ok(StepOutputs::new())
        }
        Err(error) => {
            log.push(
                context,
                "Logout from Cloud Director",
                StepStatus::Failure,
                format!("Failed to logout: {error}"),
            );
            Err(error.into())
        }
    }
}

/// `session:logout-manager`: delete the manager logon session named in the
/// login response the host captured.
pub struct LogoutManager;

#[async_trait]
impl StepHandler for LogoutManager {
    fn name(&self) -> &'static str {
        "session:logout-manager"
    }

    fn summary(&self) -> &'static str {
        "Delete the backup manager logon session from the login response"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        let login_xml = ctx.require_str(keys::SESSION_XML)?.to_string();
        let Some(session_id) = extract_session_id(&login_xml).map(str::to_string) else {
            ctx.log.push(
                CONTEXT_ALL_VMS,
                "Parse Login Response",
                StepStatus::Failure,
                "SessionId not found in login response XML",
            );
            bail!("SessionId not found in login response XML");
        };
        ctx.log.push(
            CONTEXT_ALL_VMS,
            "Parse Login Response",
            StepStatus::Success,
            format!("Extracted SessionId: {session_id}"),
        );
        let client = manager_from_inputs(ctx)?;
        logout_manager(&client, &session_id, &mut ctx.log).await
    }
}

pub(crate) async fn logout_manager(api: &dyn ManagerApi, session_id: &str, log: &mut WorkflowLog) -> Result<StepOutputs> {
    match api.delete_session(session_id).await {
        Ok(()) => {
            log.push(
                CONTEXT_ALL_VMS,
                "Logout from Backup Manager",
                StepStatus::Success,
                "Successfully logged out from the backup manager",
            );
            Ok(StepOutputs::new())
        }
        Err(error) => {
            log.push(
                CONTEXT_ALL_VMS,
                "Logout from Backup Manager",
                StepStatus::Failure,
                format!("Failed to logout: {error}"),
            );
            Err(error.into())
        }
    }
}

/// Pull the `SessionId` element out of the login response body.
///
/// The response is a single small XML document with one (namespaced)
/// `SessionId` element; a tag scan covers both `<SessionId>` and prefixed
/// `<ns:SessionId>` forms without pulling in an XML parser.
pub(crate) fn extract_session_id(xml: &str) -> Option<&str> {
    let open = "SessionId>";
    let start = xml.find(open)? + open.len();
    let rest = &xml[start..];
    let end = rest.find('<')?;
    let value = rest[..end].trim();
    let closes = rest[end..].starts_with("</") && rest[end..].contains(open);
    (closes && !value.is_empty()).then_some(value)
}

/// `session:logout-server`: revoke the bearer token on the backup server.
pub struct LogoutServer;

#[async_trait]
impl StepHandler for LogoutServer {
    fn name(&self) -> &'static str {
        "session:logout-server"
    }

    fn summary(&self) -> &'static str {
        "Revoke the backup server bearer token"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs> {
        ctx.log.push(
            CONTEXT_ALL_VMS,
            "Authenticate with backup server",
            StepStatus::Success,
            "Using provided bearer token",
        );
        let client = server_from_inputs(ctx)?;
        logout_server(&client, &mut ctx.log).await
    }
}

pub(crate) async fn logout_server(api: &dyn BackupServerApi, log: &mut WorkflowLog) -> Result<StepOutputs> {
    match api.logout().await {
        Ok(()) => {
            log.push(
                CONTEXT_ALL_VMS,
                "Logout from Backup Server",
                StepStatus::Success,
                "Successfully logged out from the backup server",
            );
            Ok(StepOutputs::new())
        }
        Err(error) => {
            log.push(
                CONTEXT_ALL_VMS,
                "Logout from Backup Server",
                StepStatus::Failure,
                format!("Failed to logout: {error}"),
            );
            Err(error.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::vms::tests::FakeDirector;
    use crate::testing::{FakeManager, FakeServer};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const LOGIN_XML: &str = concat!(
        r#"<?xml version="1.0" encoding="utf-8"?>"#,
        r#"<LogonSession xmlns="http://www.example.com/ent/v1.0">"#,
        r#"<Links><Link Rel="Down" Href="https://host:9398/api/jobs"/></Links>"#,
        r#"<SessionId>f1b2c3d4-aaaa-bbbb-cccc-000011112222</SessionId>"#,
        r#"</LogonSession>"#,
    );

    #[test]
    fn session_id_extraction_handles_namespaces_and_garbage() {
        assert_eq!(extract_session_id(LOGIN_XML), Some("f1b2c3d4-aaaa-bbbb-cccc-000011112222"));
        assert_eq!(
            extract_session_id("<ns0:SessionId>abc-123</ns0:SessionId>"),
            Some("abc-123")
        );
        assert_eq!(extract_session_id("<SessionId></SessionId>"), None);
        assert_eq!(extract_session_id("<LogonSession/>"), None);
        assert_eq!(extract_session_id("not xml at all"), None);
    }

    #[tokio::test]
    async fn director_logout_appends_a_success_record() {
        let fake = FakeDirector::default();
        let mut log = WorkflowLog::new();

        logout_director(&fake, CONTEXT_NONE, &mut log).await.unwrap();
        let last = log.records().last().unwrap();
        assert_eq!(last.step, "Logout from Cloud Director");
        assert_eq!(last.status, StepStatus::Success);
    }

    #[tokio::test]
    async fn manager_logout_deletes_the_extracted_session() {
        let fake = FakeManager::default();
        let mut log = WorkflowLog::new();

        logout_manager(&fake, "f1b2c3d4", &mut log).await.unwrap();
        assert_eq!(*fake.deleted_sessions.lock().unwrap(), vec!["f1b2c3d4".to_string()]);
    }

    #[tokio::test]
    async fn manager_handler_fails_cleanly_on_unparseable_login_response() {
        let mut ctx = StepContext::new(
            json!({"contentAsString": "<LogonSession/>", "manager_url": "https://host:9398/api", "manager_token": "t"})
                .as_object()
                .cloned()
                .unwrap(),
        );

        let result = LogoutManager.run(&mut ctx).await;
        assert!(result.is_err());
        let last = ctx.log.records().last().unwrap();
        assert_eq!(last.step, "Parse Login Response");
        assert_eq!(last.status, StepStatus::Failure);
    }

    #[tokio::test]
    async fn server_logout_revokes_the_token() {
        let fake = FakeServer::default();
        let mut log = WorkflowLog::new();

        logout_server(&fake, &mut log).await.unwrap();
        assert_eq!(fake.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(log.records().last().unwrap().step, "Logout from Backup Server");
    }
}
