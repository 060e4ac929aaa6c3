//! Legacy backup-manager client (session-token API generation).
//!
//! The base URL already carries the `/api` prefix (that is how the host
//! hands it to every step), mutations answer `202 Accepted`, and the session
//! is a server-side object that must be deleted explicitly on logout.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use vaultline_types::{
    ServiceKind,
    manager::{FullRestoreRequest, JobIncludeRequest, ObjectsInJob, RefList, RestoreTask},
};

use crate::{ApiError, ApiResult, build_http_client, decode_body, expect_status, request};

/// Surface of the legacy manager API used by the handlers.
#[async_trait]
pub trait ManagerApi: Send + Sync {
    async fn jobs(&self) -> ApiResult<RefList>;
    async fn backups(&self) -> ApiResult<RefList>;
    async fn vm_restore_points(&self) -> ApiResult<RefList>;
    async fn hierarchy_roots(&self) -> ApiResult<RefList>;
    /// VMs currently included in a job.
    async fn job_objects(&self, job_id: &str) -> ApiResult<ObjectsInJob>;
    /// Add a VM to a job (expects `202 Accepted`).
    async fn add_job_object(&self, job_id: &str, include: &JobIncludeRequest) -> ApiResult<()>;
    /// Remove a VM from a job by its membership id (expects `202 Accepted`).
    async fn remove_job_object(&self, job_id: &str, object_in_job_id: &str) -> ApiResult<()>;
    /// Trigger a full VM restore from a restore point (expects `202`).
    async fn restore_vm(&self, restore_point_id: &str, restore: &FullRestoreRequest) -> ApiResult<RestoreTask>;
    /// Delete a logon session (expects `204 No Content`).
    async fn delete_session(&self, session_id: &str) -> ApiResult<()>;
}

/// Thin wrapper around a configured `reqwest::Client` for the manager API.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    base_url: String,
    http: Client,
}

impl ManagerClient {
    /// Construct a client from the full base URL (including `/api`) and a
    /// caller-supplied session token.
    pub fn new(base_url: &str, token: &str) -> ApiResult<Self> {
        if base_url.trim().is_empty() {
            return Err(ApiError::Config("manager base URL must not be empty".into()));
        }
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http: build_http_client(ServiceKind::Manager, Some(token))?,
        })
    }

    /// Open a session with basic credentials and return its token.
    ///
    /// Used by the CLI connectivity check only; handlers never log in.
    pub async fn login(base_url: &str, username: &str, password: &str) -> ApiResult<String> {
        let http = build_http_client(ServiceKind::Manager, None)?;
        let base = base_url.trim().trim_end_matches('/');
        let response = request(&http, base, Method::POST, "/sessionMngr/?v=latest")
            .basic_auth(username, Some(password))
            .send()
            .await?;
        let token = response
            .headers()
            .get("X-RestSvcSessionId")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: vaultline_util::redact_sensitive(&vaultline_util::http::body_snippet(&body)),
            });
        }
        token.ok_or_else(|| ApiError::Decode("login response carried no session header".into()))
    }

    async fn get_refs(&self, path: &str) -> ApiResult<RefList> {
        let response = request(&self.http, &self.base_url, Method::GET, path).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        decode_body(&body)
    }
}

#[async_trait]
impl ManagerApi for ManagerClient {
    async fn jobs(&self) -> ApiResult<RefList> {
        self.get_refs("/jobs").await
    }

    async fn backups(&self) -> ApiResult<RefList> {
        self.get_refs("/backups").await
    }

    async fn vm_restore_points(&self) -> ApiResult<RefList> {
        self.get_refs("/vmRestorePoints").await
    }

    async fn hierarchy_roots(&self) -> ApiResult<RefList> {
        self.get_refs("/hierarchyRoots").await
    }

    async fn job_objects(&self, job_id: &str) -> ApiResult<ObjectsInJob> {
        let path = format!("/jobs/{job_id}/includes");
        let response = request(&self.http, &self.base_url, Method::GET, &path).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        decode_body(&body)
    }

    async fn add_job_object(&self, job_id: &str, include: &JobIncludeRequest) -> ApiResult<()> {
        let path = format!("/jobs/{job_id}/includes");
        let response = request(&self.http, &self.base_url, Method::POST, &path)
            .json(include)
            .send()
            .await?;
        expect_status(response, StatusCode::ACCEPTED).await?;
        Ok(())
    }

    async fn remove_job_object(&self, job_id: &str, object_in_job_id: &str) -> ApiResult<()> {
        let path = format!("/jobs/{job_id}/includes/{object_in_job_id}");
        let response = request(&self.http, &self.base_url, Method::DELETE, &path).send().await?;
        expect_status(response, StatusCode::ACCEPTED).await?;
        Ok(())
    }

    async fn restore_vm(&self, restore_point_id: &str, restore: &FullRestoreRequest) -> ApiResult<RestoreTask> {
        let path = format!("/vmRestorePoints/{restore_point_id}?action=restore");
        let response = request(&self.http, &self.base_url, Method::POST, &path)
            .json(restore)
            .send()
            .await?;
        let body = expect_status(response, StatusCode::ACCEPTED).await?;
        decode_body(&body)
    }

    async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        let path = format!("/logonSessions/{session_id}");
        let response = request(&self.http, &self.base_url, Method::DELETE, &path).send().await?;
        expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_rejects_empty_base_url() {
        assert!(matches!(ManagerClient::new("  ", "token"), Err(ApiError::Config(_))));
        assert!(ManagerClient::new("https://host:9398/api", "token").is_ok());
    }

    #[test]
    fn trailing_slashes_are_normalized_away() {
        let client = ManagerClient::new("https://host:9398/api/", "token").unwrap();
        assert_eq!(client.base_url, "https://host:9398/api");
    }
}
