//! Vendor API client utilities.
//!
//! This crate provides lightweight clients for the three services the step
//! handlers orchestrate:
//!
//! - [`DirectorClient`] - the cloud director inventory API (paged listings)
//! - [`ManagerClient`] - the legacy backup-manager API (session tokens)
//! - [`BackupServerClient`] - the modern backup-server API (bearer tokens)
//!
//! Clients are constructed from a caller-supplied endpoint and token; no
//! client acquires credentials on its own (the `login` helpers exist for the
//! CLI's connectivity checks only). Each client implements a narrow
//! `#[async_trait]` trait so handlers can be exercised against in-memory
//! fakes.
//!
//! The appliances these clients talk to sit on management networks with
//! self-signed certificates, so certificate verification is disabled, as a
//! fixed property of the deployment rather than an option.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header};
use tracing::debug;
use vaultline_types::ServiceKind;
use vaultline_util::{http::body_snippet, redact_sensitive};

mod director;
mod error;
mod manager;
mod server;

pub use director::{
    COMPUTE_POLICIES_PATH, DirectorApi, DirectorClient, PAGE_SIZE, VDCS_PATH, fetch_all_pages, policy_vdcs_path,
    policy_vms_path,
};
pub use error::{ApiError, ApiResult};
pub use manager::{ManagerApi, ManagerClient};
pub use server::{BackupServerApi, BackupServerClient};

/// Per-connection timeout applied to every vendor call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the underlying HTTP client for a service, with the service's
/// accept/version headers and the caller's token installed as defaults.
pub(crate) fn build_http_client(kind: ServiceKind, token: Option<&str>) -> ApiResult<Client> {
    let mut default_headers = header::HeaderMap::new();
    default_headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(kind.accept_header()),
    );
    if let Some((name, value)) = kind.api_version_header() {
        default_headers.insert(name, header::HeaderValue::from_static(value));
    }
    if let Some(token) = token {
        let value = if kind.bearer_scheme() {
            format!("Bearer {token}")
        } else {
            token.to_string()
        };
        let mut value = header::HeaderValue::from_str(&value)
            .map_err(|_| ApiError::Config("token contains non-header characters".into()))?;
        value.set_sensitive(true);
        default_headers.insert(kind.auth_header(), value);
    }

    Client::builder()
        .default_headers(default_headers)
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(ApiError::from)
}

/// Join a base URL and an API-relative path, then build the request.
pub(crate) fn request(http: &Client, base_url: &str, method: Method, path: &str) -> RequestBuilder {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    debug!(%url, "building request");
    http.request(method, url)
}

/// Read the body and enforce the expected status, or map the response into
/// [`ApiError::Status`] with a redacted, bounded body excerpt.
pub(crate) async fn expect_status(response: Response, expected: StatusCode) -> ApiResult<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status != expected {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: redact_sensitive(&body_snippet(&body)),
        });
    }
    Ok(body)
}

/// Decode a response body into `T` via strict JSON parsing.
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(body: &str) -> ApiResult<T> {
    let value = vaultline_util::http::parse_json_strict(body).map_err(|error| ApiError::Decode(error.to_string()))?;
    serde_json::from_value(value).map_err(|error| ApiError::Decode(error.to_string()))
}
