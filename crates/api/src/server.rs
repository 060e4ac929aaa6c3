//! Modern backup-server client (OAuth2 API generation).

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use vaultline_types::{
    ServiceKind,
    server::{InstantRecoverySpec, JobSpec, RepositoryList},
};

use crate::{ApiError, ApiResult, build_http_client, decode_body, expect_status, request};

/// Surface of the modern backup-server API used by the handlers.
#[async_trait]
pub trait BackupServerApi: Send + Sync {
    /// Backup repositories eligible to store job data.
    async fn repositories(&self) -> ApiResult<RepositoryList>;
    /// Create a backup job (expects `201 Created`).
    async fn create_job(&self, spec: &JobSpec) -> ApiResult<()>;
    /// Trigger an instant recovery and return the raw acknowledgement
    /// (expects `201 Created`).
    async fn instant_recovery(&self, spec: &InstantRecoverySpec) -> ApiResult<Value>;
    /// Revoke the caller-supplied token (expects `200 OK`).
    async fn logout(&self) -> ApiResult<()>;
}

/// Thin wrapper around a configured `reqwest::Client` for the backup server.
#[derive(Debug, Clone)]
pub struct BackupServerClient {
    base_url: String,
    http: Client,
}

impl BackupServerClient {
    /// Construct a client from the server base URL (scheme + host + port)
    /// and a caller-supplied bearer token.
    pub fn new(base_url: &str, token: &str) -> ApiResult<Self> {
        if base_url.trim().is_empty() {
            return Err(ApiError::Config("backup server base URL must not be empty".into()));
        }
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http: build_http_client(ServiceKind::BackupServer, Some(token))?,
        })
    }

    /// Acquire an access token through the password grant.
    ///
    /// Used by the CLI connectivity check only; handlers never log in.
    pub async fn login(base_url: &str, username: &str, password: &str) -> ApiResult<String> {
        let http = build_http_client(ServiceKind::BackupServer, None)?;
        let base = base_url.trim().trim_end_matches('/');
        let form = [("grant_type", "password"), ("username", username), ("password", password)];
        let response = request(&http, base, Method::POST, "/api/oauth2/token").form(&form).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        let value: Value = decode_body(&body)?;
        value
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("token response carried no access_token".into()))
    }
}

#[async_trait]
impl BackupServerApi for BackupServerClient {
    async fn repositories(&self) -> ApiResult<RepositoryList> {
        let response = request(&self.http, &self.base_url, Method::GET, "/api/v1/backupInfrastructure/repositories")
            .send()
            .await?;
        let body = expect_status(response, StatusCode::OK).await?;
        decode_body(&body)
    }

    async fn create_job(&self, spec: &JobSpec) -> ApiResult<()> {
        let response = request(&self.http, &self.base_url, Method::POST, "/api/v1/jobs")
            .json(spec)
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn instant_recovery(&self, spec: &InstantRecoverySpec) -> ApiResult<Value> {
        let response = request(&self.http, &self.base_url, Method::POST, "/api/v1/restore/instantRecovery/vSphere/vm")
            .json(spec)
            .send()
            .await?;
        let body = expect_status(response, StatusCode::CREATED).await?;
        decode_body(&body)
    }

    async fn logout(&self) -> ApiResult<()> {
        let response = request(&self.http, &self.base_url, Method::POST, "/api/oauth2/logout")
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_normalizes_its_base_url() {
        let client = BackupServerClient::new("https://host:9419/", "token").unwrap();
        assert_eq!(client.base_url, "https://host:9419");
        assert!(matches!(BackupServerClient::new("", "token"), Err(ApiError::Config(_))));
    }
}
