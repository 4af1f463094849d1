use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use runrelay_core::{
    AssistantGateway, MessageRole, Run, RunStatus, ThreadMessage, ToolCall, ToolOutput,
};

/// One call observed by a [`ScriptedGateway`], in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateThread {
        thread_id: String,
    },
    AddMessage {
        thread_id: String,
        content: String,
    },
    CreateRun {
        thread_id: String,
        run_id: String,
        assistant_id: String,
    },
    RetrieveRun {
        run_id: String,
        status: RunStatus,
    },
    SubmitToolOutputs {
        run_id: String,
        outputs: Vec<ToolOutput>,
    },
    ListMessages {
        thread_id: String,
        run_id: Option<String>,
    },
}

/// Gateway operations that can be made to fail or stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateThread,
    AddMessage,
    CreateRun,
    RetrieveRun,
    SubmitToolOutputs,
    ListMessages,
}

#[derive(Debug, Clone)]
struct Step {
    status: RunStatus,
    tool_calls: Vec<ToolCall>,
    last_error: Option<String>,
}

#[derive(Default)]
struct State {
    next_thread: usize,
    next_run: usize,
    /// Threads in creation order, oldest first.
    threads: VecDeque<String>,
    runs: HashMap<String, (String, VecDeque<Step>)>,
    messages: HashMap<String, Vec<ThreadMessage>>,
    replied: HashSet<String>,
    calls: VecDeque<GatewayCall>,
}

/// In-memory assistant gateway that replays a scripted run lifecycle.
///
/// Every run created through it walks the same script: each `retrieve_run`
/// consumes one step and the final step repeats forever. Threads are named
/// `T1`, `T2`, ... and runs `R1`, `R2`, ... in creation order.
///
/// Nothing is forgotten unless a retention limit is set with
/// [`ScriptedGateway::with_retention`].
#[derive(Default)]
pub struct ScriptedGateway {
    script: Vec<Step>,
    reply: Option<String>,
    failing: HashSet<Operation>,
    stalling: HashSet<Operation>,
    max_threads: Option<usize>,
    max_calls: Option<usize>,
    state: Mutex<State>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step reporting `status` with no pending tool calls.
    pub fn then_status(mut self, status: RunStatus) -> Self {
        self.script.push(Step {
            status,
            tool_calls: Vec::new(),
            last_error: None,
        });
        self
    }

    /// Append a `requires_action` step carrying `calls`.
    pub fn then_action(mut self, calls: Vec<ToolCall>) -> Self {
        self.script.push(Step {
            status: RunStatus::RequiresAction,
            tool_calls: calls,
            last_error: None,
        });
        self
    }

    /// Append a terminal `failed` step with an error message.
    pub fn then_failure(mut self, message: impl Into<String>) -> Self {
        self.script.push(Step {
            status: RunStatus::Failed,
            tool_calls: Vec::new(),
            last_error: Some(message.into()),
        });
        self
    }

    /// Assistant message the run posts to its thread when it completes.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Make every call of `op` fail.
    pub fn failing(mut self, op: Operation) -> Self {
        self.failing.insert(op);
        self
    }

    /// Make every call of `op` hang without ever returning.
    pub fn stalling(mut self, op: Operation) -> Self {
        self.stalling.insert(op);
        self
    }

    /// Keep at most `threads` threads (with their runs and messages) and the
    /// latest `calls` entries of the call log. Oldest entries go first.
    pub fn with_retention(mut self, threads: usize, calls: usize) -> Self {
        self.max_threads = Some(threads);
        self.max_calls = Some(calls);
        self
    }

    /// Post an assistant message that no run created.
    pub fn post_assistant_message(&self, thread_id: &str, content: impl Into<String>) {
        self.lock()
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(ThreadMessage {
                role: MessageRole::Assistant,
                content: content.into(),
                run_id: None,
            });
    }

    /// Calls observed so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.iter().cloned().collect()
    }

    /// Tool outputs submitted so far, flattened in submission order.
    pub fn submitted_outputs(&self) -> Vec<ToolOutput> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::SubmitToolOutputs { outputs, .. } => Some(outputs.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of threads created so far.
    pub fn threads_created(&self) -> usize {
        self.lock().next_thread
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn check(&self, op: Operation) -> Result<()> {
        if self.stalling.contains(&op) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&op) {
            anyhow::bail!("scripted failure in {op:?}");
        }
        Ok(())
    }

    fn record(&self, state: &mut State, call: GatewayCall) {
        state.calls.push_back(call);
        if let Some(max) = self.max_calls {
            while state.calls.len() > max {
                state.calls.pop_front();
            }
        }
    }

    fn evict_threads(&self, state: &mut State) {
        let Some(max) = self.max_threads else {
            return;
        };
        while state.threads.len() > max {
            let Some(thread_id) = state.threads.pop_front() else {
                break;
            };
            state.messages.remove(&thread_id);
            state.runs.retain(|_, (owner, _)| *owner != thread_id);
            let runs = &state.runs;
            state.replied.retain(|run_id| runs.contains_key(run_id));
        }
    }
}

#[async_trait]
impl AssistantGateway for ScriptedGateway {
    async fn create_thread(&self) -> Result<String> {
        self.check(Operation::CreateThread).await?;
        let mut guard = self.lock();
        let state = &mut *guard;
        state.next_thread += 1;
        let thread_id = format!("T{}", state.next_thread);
        state.messages.insert(thread_id.clone(), Vec::new());
        state.threads.push_back(thread_id.clone());
        self.evict_threads(state);
        self.record(
            state,
            GatewayCall::CreateThread {
                thread_id: thread_id.clone(),
            },
        );
        Ok(thread_id)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()> {
        self.check(Operation::AddMessage).await?;
        let mut guard = self.lock();
        let state = &mut *guard;
        self.record(
            state,
            GatewayCall::AddMessage {
                thread_id: thread_id.to_string(),
                content: content.to_string(),
            },
        );
        state
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(ThreadMessage {
                role: MessageRole::User,
                content: content.to_string(),
                run_id: None,
            });
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        self.check(Operation::CreateRun).await?;
        let mut guard = self.lock();
        let state = &mut *guard;
        state.next_run += 1;
        let run_id = format!("R{}", state.next_run);
        let steps = self.script.iter().cloned().collect();
        state
            .runs
            .insert(run_id.clone(), (thread_id.to_string(), steps));
        self.record(
            state,
            GatewayCall::CreateRun {
                thread_id: thread_id.to_string(),
                run_id: run_id.clone(),
                assistant_id: assistant_id.to_string(),
            },
        );
        Ok(run_id)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.check(Operation::RetrieveRun).await?;
        let mut guard = self.lock();
        let state = &mut *guard;
        let (owner, steps) = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow::anyhow!("run '{run_id}' does not exist"))?;
        if owner.as_str() != thread_id {
            anyhow::bail!("run '{run_id}' does not belong to thread '{thread_id}'");
        }

        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
        .unwrap_or(Step {
            status: RunStatus::InProgress,
            tool_calls: Vec::new(),
            last_error: None,
        });

        self.record(
            state,
            GatewayCall::RetrieveRun {
                run_id: run_id.to_string(),
                status: step.status,
            },
        );

        if step.status == RunStatus::Completed && state.replied.insert(run_id.to_string()) {
            if let Some(reply) = &self.reply {
                state
                    .messages
                    .entry(thread_id.to_string())
                    .or_default()
                    .push(ThreadMessage {
                        role: MessageRole::Assistant,
                        content: reply.clone(),
                        run_id: Some(run_id.to_string()),
                    });
            }
        }

        let run = Run::new(run_id, thread_id, step.status).with_tool_calls(step.tool_calls);
        Ok(match step.last_error {
            Some(message) => run.with_last_error(message),
            None => run,
        })
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<()> {
        self.check(Operation::SubmitToolOutputs).await?;
        let mut guard = self.lock();
        self.record(
            &mut guard,
            GatewayCall::SubmitToolOutputs {
                run_id: run_id.to_string(),
                outputs,
            },
        );
        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<ThreadMessage>> {
        self.check(Operation::ListMessages).await?;
        let mut guard = self.lock();
        let state = &mut *guard;
        self.record(
            state,
            GatewayCall::ListMessages {
                thread_id: thread_id.to_string(),
                run_id: run_id.map(str::to_string),
            },
        );
        let messages = state.messages.get(thread_id).cloned().unwrap_or_default();
        Ok(messages
            .into_iter()
            .rev()
            .filter(|m| run_id.is_none() || m.run_id.as_deref() == run_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_steps_then_sticks_on_last() {
        let gateway = ScriptedGateway::new()
            .then_status(RunStatus::Queued)
            .then_status(RunStatus::InProgress)
            .then_status(RunStatus::Completed);

        let thread = gateway.create_thread().await.unwrap();
        let run = gateway.create_run(&thread, "asst").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(gateway.retrieve_run(&thread, &run).await.unwrap().status);
        }
        assert_eq!(
            seen,
            vec![
                RunStatus::Queued,
                RunStatus::InProgress,
                RunStatus::Completed,
                RunStatus::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_each_run_replays_script() {
        let gateway = ScriptedGateway::new()
            .then_status(RunStatus::Queued)
            .then_status(RunStatus::Completed);

        let t1 = gateway.create_thread().await.unwrap();
        let t2 = gateway.create_thread().await.unwrap();
        assert_eq!((t1.as_str(), t2.as_str()), ("T1", "T2"));

        let r1 = gateway.create_run(&t1, "asst").await.unwrap();
        gateway.retrieve_run(&t1, &r1).await.unwrap();
        let r2 = gateway.create_run(&t2, "asst").await.unwrap();
        let first = gateway.retrieve_run(&t2, &r2).await.unwrap();
        assert_eq!(first.status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn test_reply_posted_once_on_completion() {
        let gateway = ScriptedGateway::new()
            .then_status(RunStatus::Completed)
            .with_reply("all done");

        let thread = gateway.create_thread().await.unwrap();
        gateway.add_message(&thread, "hello").await.unwrap();
        let run = gateway.create_run(&thread, "asst").await.unwrap();
        gateway.retrieve_run(&thread, &run).await.unwrap();
        gateway.retrieve_run(&thread, &run).await.unwrap();

        let messages = gateway.list_messages(&thread, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "all done");
        assert_eq!(messages[1].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_failing_operation() {
        let gateway = ScriptedGateway::new().failing(Operation::CreateThread);
        assert!(gateway.create_thread().await.is_err());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_checks_thread() {
        let gateway = ScriptedGateway::new().then_status(RunStatus::Completed);
        let thread = gateway.create_thread().await.unwrap();
        let run = gateway.create_run(&thread, "asst").await.unwrap();
        assert!(gateway.retrieve_run("other", &run).await.is_err());
        assert!(gateway.retrieve_run(&thread, "R99").await.is_err());
    }

    #[tokio::test]
    async fn test_list_messages_by_run() {
        let gateway = ScriptedGateway::new()
            .then_status(RunStatus::Completed)
            .with_reply("fresh");

        let thread = gateway.create_thread().await.unwrap();
        gateway.post_assistant_message(&thread, "stale");
        let run = gateway.create_run(&thread, "asst").await.unwrap();
        gateway.retrieve_run(&thread, &run).await.unwrap();

        let all = gateway.list_messages(&thread, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let by_run = gateway.list_messages(&thread, Some(run.as_str())).await.unwrap();
        assert_eq!(by_run.len(), 1);
        assert_eq!(by_run[0].content, "fresh");
        assert!(gateway.list_messages(&thread, Some("R99")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_bounds_state() {
        let gateway = ScriptedGateway::new()
            .then_status(RunStatus::Completed)
            .with_reply("done")
            .with_retention(2, 5);

        for _ in 0..10 {
            let thread = gateway.create_thread().await.unwrap();
            let run = gateway.create_run(&thread, "asst").await.unwrap();
            gateway.retrieve_run(&thread, &run).await.unwrap();
        }

        assert_eq!(gateway.threads_created(), 10);
        assert_eq!(gateway.calls().len(), 5);
        let state = gateway.lock();
        assert_eq!(state.threads, VecDeque::from(["T9".to_string(), "T10".to_string()]));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.runs.len(), 2);
        assert_eq!(state.replied.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalling_operation_never_returns() {
        let gateway = ScriptedGateway::new().stalling(Operation::CreateRun);
        let thread = gateway.create_thread().await.unwrap();
        let stalled = tokio::time::timeout(
            std::time::Duration::from_secs(3600),
            gateway.create_run(&thread, "asst"),
        )
        .await;
        assert!(stalled.is_err());
    }
}
