//! Step execution context shared by every handler.
//!
//! The orchestration host hands each step a flat JSON object of inputs; the
//! context wraps that object with typed accessors and carries the workflow
//! log accumulator, seeded from the previous step's `workflow_logs` value.

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use vaultline_types::WorkflowLog;

use crate::keys;

/// Inputs plus the running workflow log for one handler invocation.
#[derive(Debug, Default)]
pub struct StepContext {
    inputs: Map<String, Value>,
    /// Log accumulator; handlers append, the dispatcher returns it in the
    /// outputs under [`keys::WORKFLOW_LOGS`].
    pub log: WorkflowLog,
}

impl StepContext {
    /// Wrap the host-supplied inputs, seeding the log from
    /// [`keys::WORKFLOW_LOGS`] when the previous step passed one along.
    pub fn new(inputs: Map<String, Value>) -> Self {
        let log = WorkflowLog::from_value(inputs.get(keys::WORKFLOW_LOGS));
        Self { inputs, log }
    }

    /// Raw input value, if present.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// A required, non-empty string input.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.optional_str(key) {
            Some(value) => Ok(value),
            None => Err(anyhow!("missing required input '{key}'")),
        }
    }

    /// A string input, treating absent, null and empty values alike.
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str).filter(|value| !value.trim().is_empty())
    }

    /// An optional unsigned integer input.
    pub fn optional_u64(&self, key: &str) -> Option<u64> {
        self.inputs.get(key).and_then(Value::as_u64)
    }

    /// A boolean input with a default for absent/null values.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.inputs.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Deserialize a required input into a typed value.
    pub fn require_typed<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.inputs.get(key).ok_or_else(|| anyhow!("missing required input '{key}'"))?;
        typed_from(key, value)
    }

    /// Deserialize an input when present and non-null.
    pub fn optional_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.inputs.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => typed_from(key, value).map(Some),
        }
    }
}

/// Decode a JSON value, accepting the host's habit of passing arrays as
/// embedded JSON strings.
fn typed_from<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T> {
    let value = match value {
        // Some host steps serialize structured values before passing them on.
        Value::String(text) if !text.trim().is_empty() && looks_structured(text) => {
            serde_json::from_str(text).with_context(|| format!("input '{key}' is not valid embedded JSON"))?
        }
        other => other.clone(),
    };
    serde_json::from_value(value).with_context(|| format!("input '{key}' has an unexpected shape"))
}

fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('[') || trimmed.starts_with('{')
}

/// Decode a list of raw JSON items, skipping records that do not match.
///
/// Vendor listings routinely mix record shapes; entries the pipeline cannot
/// use are dropped rather than failing the whole step.
pub fn decode_items<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items.into_iter().filter_map(|item| serde_json::from_value(item).ok()).collect()
}

/// Build an outputs map from key/value pairs.
pub fn outputs(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    pairs.into_iter().map(|(key, value)| (key.to_string(), value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vaultline_types::inventory::VmRef;

    fn ctx(value: Value) -> StepContext {
        StepContext::new(value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn seeds_the_log_from_prior_step_outputs() {
        let context = ctx(json!({
            "workflow_logs": [{
                "timestamp": "2025-05-02T10:00:00",
                "context": "vdc-a",
                "step": "Fetch VMs",
                "status": "success",
                "details": "ok"
            }]
        }));
        assert_eq!(context.log.len(), 1);
        assert!(ctx(json!({})).log.is_empty());
    }

    #[test]
    fn string_accessors_treat_empty_as_absent() {
        let context = ctx(json!({"director_token": "", "vdc_name": "vdc-a"}));
        assert!(context.optional_str("director_token").is_none());
        assert_eq!(context.require_str("vdc_name").unwrap(), "vdc-a");
        assert!(context.require_str("director_token").is_err());
    }

    #[test]
    fn typed_inputs_accept_embedded_json_strings() {
        let direct = ctx(json!({"vms": [{"name": "a", "id": "urn:1"}]}));
        let stringly = ctx(json!({"vms": "[{\"name\": \"a\", \"id\": \"urn:1\"}]"}));

        let from_direct: Vec<VmRef> = direct.require_typed("vms").unwrap();
        let from_string: Vec<VmRef> = stringly.require_typed("vms").unwrap();
        assert_eq!(from_direct, from_string);
    }

    #[test]
    fn optional_typed_skips_null() {
        let context = ctx(json!({"missing_vms": null}));
        let decoded: Option<Vec<VmRef>> = context.optional_typed("missing_vms").unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_items_drops_mismatched_records() {
        let decoded: Vec<VmRef> = decode_items(vec![
            json!({"name": "a", "id": "urn:1"}),
            json!({"unrelated": true}),
        ]);
        assert_eq!(decoded.len(), 1);
    }
}
