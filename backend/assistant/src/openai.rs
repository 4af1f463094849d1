use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use runrelay_core::{
    AssistantGateway, MessageRole, Run, RunStatus, ThreadMessage, ToolCall, ToolOutput,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Assistants (v2) gateway.
pub struct OpenAiAssistants {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAssistants {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("{what}: HTTP request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("{what}: OpenAI returned {status}: {error_body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("{what}: failed to parse response"))
    }
}

#[derive(Serialize)]
struct EmptyBody {}

#[derive(Deserialize)]
struct ObjectId {
    id: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    assistant_id: &'a str,
}

#[derive(Serialize)]
struct SubmitToolOutputs {
    tool_outputs: Vec<ToolOutput>,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    thread_id: String,
    status: RunStatus,
    required_action: Option<RequiredAction>,
    last_error: Option<LastError>,
}

#[derive(Deserialize)]
struct RequiredAction {
    submit_tool_outputs: Option<RequiredToolOutputs>,
}

#[derive(Deserialize)]
struct RequiredToolOutputs {
    tool_calls: Vec<RunToolCall>,
}

#[derive(Deserialize)]
struct RunToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct LastError {
    code: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Deserialize)]
struct MessageObject {
    role: MessageRole,
    #[serde(default)]
    run_id: Option<String>,
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextContent {
    value: String,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        let tool_calls = run
            .required_action
            .and_then(|a| a.submit_tool_outputs)
            .map(|s| {
                s.tool_calls
                    .into_iter()
                    .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
                    .collect()
            })
            .unwrap_or_default();

        Run {
            id: run.id,
            thread_id: run.thread_id,
            status: run.status,
            tool_calls,
            last_error: run.last_error.map(|e| match e.code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message,
            }),
        }
    }
}

impl From<MessageObject> for ThreadMessage {
    fn from(message: MessageObject) -> Self {
        let content = message
            .content
            .into_iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.value),
                MessageContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        ThreadMessage {
            role: message.role,
            content,
            run_id: message.run_id,
        }
    }
}

#[async_trait]
impl AssistantGateway for OpenAiAssistants {
    async fn create_thread(&self) -> Result<String> {
        let thread: ObjectId = self
            .send(
                self.request(reqwest::Method::POST, "/threads").json(&EmptyBody {}),
                "create thread",
            )
            .await?;
        debug!(thread_id = %thread.id, "Created thread");
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let _: ObjectId = self
            .send(
                self.request(reqwest::Method::POST, &format!("/threads/{thread_id}/messages"))
                    .json(&CreateMessage {
                        role: "user",
                        content,
                    }),
                "add message",
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        let run: RunObject = self
            .send(
                self.request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
                    .json(&CreateRun { assistant_id }),
                "create run",
            )
            .await?;
        debug!(thread_id = %thread_id, run_id = %run.id, status = %run.status, "Created run");
        Ok(run.id)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run: RunObject = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/threads/{thread_id}/runs/{run_id}"),
                ),
                "retrieve run",
            )
            .await?;
        Ok(run.into())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<()> {
        let _: ObjectId = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                )
                .json(&SubmitToolOutputs {
                    tool_outputs: outputs,
                }),
                "submit tool outputs",
            )
            .await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>> {
        let mut path = format!("/threads/{thread_id}/messages?order=desc&limit=20");
        if let Some(run_id) = run_id {
            path.push_str(&format!("&run_id={run_id}"));
        }
        let list: MessageList = self
            .send(self.request(reqwest::Method::GET, &path), "list messages")
            .await?;
        Ok(list.data.into_iter().map(ThreadMessage::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_object_with_required_action() {
        let json = r#"{
            "id": "run_1",
            "object": "thread.run",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "resolve_order", "arguments": "{\"name\":\"order-42\"}"}},
                        {"id": "call_2", "type": "function", "function": {"name": "resolve_order", "arguments": "{\"name\":\"order-43\"}"}}
                    ]
                }
            },
            "last_error": null
        }"#;
        let run: Run = serde_json::from_str::<RunObject>(json).unwrap().into();
        assert_eq!(run.status, RunStatus::RequiresAction);
        assert_eq!(run.tool_calls.len(), 2);
        assert_eq!(run.tool_calls[0].id, "call_1");
        assert_eq!(run.tool_calls[1].arguments, r#"{"name":"order-43"}"#);
    }

    #[test]
    fn test_run_object_failed_with_last_error() {
        let json = r#"{
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "failed",
            "required_action": null,
            "last_error": {"code": "rate_limit_exceeded", "message": "slow down"}
        }"#;
        let run: Run = serde_json::from_str::<RunObject>(json).unwrap().into();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.tool_calls.is_empty());
        assert_eq!(run.last_error.as_deref(), Some("rate_limit_exceeded: slow down"));
    }

    #[test]
    fn test_message_text_parts_joined() {
        let json = r#"{
            "data": [
                {"role": "assistant", "run_id": "run_1", "content": [
                    {"type": "text", "text": {"value": "Order resolved.", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "f"}},
                    {"type": "text", "text": {"value": "Anything else?", "annotations": []}}
                ]},
                {"role": "user", "content": [{"type": "text", "text": {"value": "fix order-42", "annotations": []}}]}
            ]
        }"#;
        let list: MessageList = serde_json::from_str(json).unwrap();
        let messages: Vec<ThreadMessage> = list.data.into_iter().map(Into::into).collect();
        assert_eq!(messages[0].role, MessageRole::Assistant);
        assert_eq!(messages[0].content, "Order resolved.\nAnything else?");
        assert_eq!(messages[0].run_id.as_deref(), Some("run_1"));
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].run_id, None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let gateway = OpenAiAssistants::new("key").with_base_url("http://localhost:9000/v1/");
        assert_eq!(gateway.base_url(), "http://localhost:9000/v1");
    }
}
