//! The step handler contract.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::StepContext;

/// Output mapping a handler returns to the orchestration host.
pub type StepOutputs = Map<String, Value>;

/// One workflow step: receives host inputs, makes its vendor calls, appends
/// to the workflow log, and returns the outputs for the next step.
///
/// Implementations append failure records *before* returning an error, so
/// the log tells the story even when a step aborts the pipeline.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Stable step identifier the host dispatches on, e.g. `vm:list`.
    fn name(&self) -> &'static str;

    /// One-line description shown by the CLI step listing.
    fn summary(&self) -> &'static str;

    /// Execute the step. The dispatcher owns the context and merges the
    /// accumulated log into the outputs afterwards.
    async fn run(&self, ctx: &mut StepContext) -> Result<StepOutputs>;
}
