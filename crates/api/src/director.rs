//! Cloud director inventory client.
//!
//! Every list endpoint is paged through the `values`/`resultTotal` envelope;
//! [`fetch_all_pages`] accumulates the pages and reports per-page progress
//! through a callback so handlers can log each page the way the workflow
//! host expects.

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use vaultline_types::{ServiceKind, director::PageEnvelope};

use crate::{ApiError, ApiResult, build_http_client, decode_body, expect_status, request};

/// Fixed page size used by the original pipeline; not configurable.
pub const PAGE_SIZE: u32 = 30;

/// Characters percent-encoded when a urn is embedded in a path segment.
const URN_SEGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b':').add(b'#').add(b'?').add(b'%').add(b'+');

/// Read-side surface of the director API, narrow enough to fake in tests.
#[async_trait]
pub trait DirectorApi: Send + Sync {
    /// Fetch one page of a paged `cloudapi` listing.
    async fn get_page(&self, path: &str, page: u32, page_size: u32) -> ApiResult<PageEnvelope>;
    /// Fetch an unpaged listing that answers a bare JSON array.
    async fn get_list(&self, path: &str) -> ApiResult<Vec<Value>>;
    /// Terminate the caller-supplied session (expects `204 No Content`).
    async fn logout(&self) -> ApiResult<()>;
}

/// Path of the tenant VDC listing.
pub const VDCS_PATH: &str = "/cloudapi/1.0.0/vdcs";
/// Path of the compute policy listing.
pub const COMPUTE_POLICIES_PATH: &str = "/cloudapi/2.0.0/vdcComputePolicies";

/// Path of the VDC association listing for a compute policy.
pub fn policy_vdcs_path(policy_id: &str) -> String {
    format!("/cloudapi/2.0.0/vdcComputePolicies/{}/vdcs", utf8_percent_encode(policy_id, URN_SEGMENT))
}

/// Path of the VM listing for a compute policy.
pub fn policy_vms_path(policy_id: &str) -> String {
    format!("/cloudapi/1.0.0/vdcComputePolicies/{}/vms", utf8_percent_encode(policy_id, URN_SEGMENT))
}

/// Thin wrapper around a configured `reqwest::Client` for director access.
#[derive(Debug, Clone)]
pub struct DirectorClient {
    base_url: String,
    http: Client,
}

impl DirectorClient {
    /// Construct a client for `https://<host>` using a caller-supplied
    /// bearer token.
    pub fn new(host: &str, token: &str) -> ApiResult<Self> {
        if host.trim().is_empty() {
            return Err(ApiError::Config("director host must not be empty".into()));
        }
        Ok(Self {
            base_url: format!("https://{}", host.trim().trim_end_matches('/')),
            http: build_http_client(ServiceKind::Director, Some(token))?,
        })
    }

    /// Acquire a provider session token with basic credentials.
    ///
    /// Used by the CLI connectivity check only; handlers never log in.
    pub async fn login(host: &str, username: &str, password: &str) -> ApiResult<String> {
        let http = build_http_client(ServiceKind::Director, None)?;
        let base_url = format!("https://{}", host.trim().trim_end_matches('/'));
        let response = request(&http, &base_url, Method::POST, "/cloudapi/1.0.0/sessions/provider")
            .basic_auth(format!("{username}@system"), Some(password))
            .send()
            .await?;
        let token = response
            .headers()
            .get("X-VMWARE-VCLOUD-ACCESS-TOKEN")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: vaultline_util::redact_sensitive(&vaultline_util::http::body_snippet(&body)),
            });
        }
        token.ok_or_else(|| ApiError::Decode("login response carried no access-token header".into()))
    }
}

#[async_trait]
impl DirectorApi for DirectorClient {
    async fn get_page(&self, path: &str, page: u32, page_size: u32) -> ApiResult<PageEnvelope> {
        let paged_path = format!("{path}?page={page}&pageSize={page_size}");
        let response = request(&self.http, &self.base_url, Method::GET, &paged_path).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        decode_body(&body)
    }

    async fn get_list(&self, path: &str) -> ApiResult<Vec<Value>> {
        let response = request(&self.http, &self.base_url, Method::GET, path).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        decode_body(&body)
    }

    async fn logout(&self) -> ApiResult<()> {
        let response = request(&self.http, &self.base_url, Method::DELETE, "/cloudapi/1.0.0/sessions/current")
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

/// Accumulate every page of a paged listing.
///
/// `on_page` receives `(page, items_on_page, total_so_far)` after each fetch.
/// The loop stops once the accumulated count reaches `resultTotal`, or on the
/// first empty page when the service omits the total.
pub async fn fetch_all_pages<F>(api: &dyn DirectorApi, path: &str, mut on_page: F) -> ApiResult<Vec<Value>>
where
    F: FnMut(u32, usize, usize),
{
    let mut page = 1u32;
    let mut all_items: Vec<Value> = Vec::new();

    loop {
        let envelope = api.get_page(path, page, PAGE_SIZE).await?;
        let fetched = envelope.values.len();
        all_items.extend(envelope.values);
        on_page(page, fetched, all_items.len());

        let total = envelope.result_total.unwrap_or(all_items.len() as u64);
        if all_items.len() as u64 >= total || fetched == 0 {
            break;
        }
        page += 1;
    }

    Ok(all_items)
}
