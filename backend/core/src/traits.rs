use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{Run, ThreadMessage, ToolOutput};

/// Client for the external assistant-run API.
///
/// Implementations own transport concerns (auth, endpoints, retries); the
/// resolver only sees these calls.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Create an empty conversation thread and return its identifier.
    async fn create_thread(&self) -> Result<String>;

    /// Append a user message to a thread.
    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Start a run of `assistant_id` on the thread and return the run identifier.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String>;

    /// Fetch the current state of a run.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Submit tool outputs for a run waiting on `requires_action`.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<()>;

    /// List the thread's messages, newest first. With `run_id`, only the
    /// messages that run created.
    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>>;
}

/// A locally registered function the assistant can call.
///
/// The input and output types are the function's contract: the registry
/// decodes arguments into `Input` and encodes `Output` as the tool result.
#[async_trait]
pub trait Function: Send + Sync + 'static {
    type Input: DeserializeOwned + Send;
    type Output: Serialize;

    /// Description for the assistant's tool configuration.
    fn description(&self) -> &str;

    /// JSON Schema of `Input`.
    fn parameters(&self) -> serde_json::Value;

    /// JSON Schema of `Output`.
    fn output_schema(&self) -> serde_json::Value;

    async fn invoke(&self, input: Self::Input) -> Result<Self::Output>;
}
