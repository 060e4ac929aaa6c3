//! Payload models for the cloud director inventory API.
//!
//! List endpoints wrap their items in a paged envelope (`values` plus a
//! `resultTotal` count); item shapes are owned by the vendor, so only the
//! fields the handlers consume are modeled and everything else is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Paged listing envelope returned by every `cloudapi` list endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageEnvelope {
    /// Items on this page, kept raw so callers decode only what they need.
    #[serde(default)]
    pub values: Vec<Value>,
    /// Total number of records across all pages, when the service reports it.
    #[serde(default, rename = "resultTotal")]
    pub result_total: Option<u64>,
}

/// A VDC as it appears in the `/cloudapi/1.0.0/vdcs` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdcSummary {
    /// Tenant-visible VDC name; records without one are skipped.
    #[serde(default)]
    pub name: Option<String>,
}

/// A VDC compute policy from `/cloudapi/2.0.0/vdcComputePolicies`.
///
/// The provider encodes the owning PVDC in the policy `description`, which is
/// what the default-policy matching runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputePolicy {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A VDC associated with a compute policy (unpaged association listing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVdc {
    #[serde(default)]
    pub name: Option<String>,
}

/// A VM listed under a compute policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVm {
    pub name: String,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_envelope_tolerates_missing_total() {
        let envelope: PageEnvelope = serde_json::from_value(json!({"values": [{"name": "vdc-a"}]})).unwrap();
        assert_eq!(envelope.values.len(), 1);
        assert_eq!(envelope.result_total, None);

        let envelope: PageEnvelope = serde_json::from_value(json!({"values": [], "resultTotal": 42})).unwrap();
        assert_eq!(envelope.result_total, Some(42));
    }

    #[test]
    fn compute_policy_description_is_optional() {
        let policy: ComputePolicy =
            serde_json::from_value(json!({"id": "urn:vcloud:vdcComputePolicy:1", "isSizingOnly": false})).unwrap();
        assert!(policy.description.is_none());
    }
}
