//! Workflow step logging shared by every handler.
//!
//! Each handler appends structured [`StepRecord`]s to a [`WorkflowLog`] that
//! the orchestration host threads through the pipeline: the accumulator is
//! seeded from the previous step's `workflow_logs` output and returned,
//! extended, in this step's outputs. Records are plain JSON on the wire so
//! the host can persist and report on them without knowing our types.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log context used when a record is not tied to a single VDC or VM.
pub const CONTEXT_NONE: &str = "N/A";
/// Log context for records that summarize work across every selected VM.
pub const CONTEXT_ALL_VMS: &str = "All VMs";
/// Log context for records that summarize work across every selected VDC.
pub const CONTEXT_ALL_VDCS: &str = "All VDCs";

/// Outcome of a single workflow step stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Stage completed as intended.
    Success,
    /// Stage failed; the handler may abort or continue depending on the step.
    Failure,
    /// Batch stage where some items succeeded and some failed.
    PartialSuccess,
    /// Noteworthy but non-fatal condition (e.g. a VM without restore points).
    Warning,
    /// Informational marker (e.g. a restore being initiated).
    Info,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::PartialSuccess => "partial_success",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(label)
    }
}

/// One structured log entry describing a step stage and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    /// ISO-8601 stamp, shifted to the operators' fixed UTC+1 report zone.
    pub timestamp: String,
    /// VDC or VM the stage operated on, or one of the `CONTEXT_*` fallbacks.
    pub context: String,
    /// Human-readable stage name, e.g. "Fetch Compute Policies".
    pub step: String,
    /// Stage outcome.
    pub status: StepStatus,
    /// Free-form detail: a message string or a structured tally object.
    pub details: Value,
}

impl StepRecord {
    /// Build a record stamped with the current report time.
    pub fn new(context: impl Into<String>, step: impl Into<String>, status: StepStatus, details: impl Into<Value>) -> Self {
        Self {
            timestamp: report_timestamp(),
            context: context.into(),
            step: step.into(),
            status,
            details: details.into(),
        }
    }
}

/// Current time in the fixed UTC+1 zone the operators' reports use.
///
/// The original workflow stamped every record one hour ahead of UTC with no
/// DST handling; reports filter records by this stamp's calendar day, so the
/// offset is part of the record format rather than a display concern.
pub fn report_timestamp() -> String {
    (Utc::now() + Duration::hours(1)).format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Append-only accumulator of [`StepRecord`]s threaded between handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowLog {
    records: Vec<StepRecord>,
}

impl WorkflowLog {
    /// Start a fresh log (first step of a pipeline).
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log from a previous step's `workflow_logs` output value.
    ///
    /// Unrecognized or absent values yield an empty log rather than an error:
    /// a handler must be runnable as the first step of a pipeline, and the
    /// host occasionally passes `null` when re-running a step in isolation.
    pub fn from_value(value: Option<&Value>) -> Self {
        let records = value
            .and_then(|v| serde_json::from_value::<Vec<StepRecord>>(v.clone()).ok())
            .unwrap_or_default();
        Self { records }
    }

    /// Append a freshly stamped record.
    pub fn push(&mut self, context: impl Into<String>, step: impl Into<String>, status: StepStatus, details: impl Into<Value>) {
        self.records.push(StepRecord::new(context, step, status, details));
    }

    /// All records accumulated so far, oldest first.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize for the `workflow_logs` output key.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.records).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}
