use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use runrelay_core::{
    AssistantGateway, FunctionRegistry, MessageRole, RelayError, Run, RunOutcome, RunStatus,
    ToolOutput,
};
use runrelay_logging::{RunEvent, RunEventLogger};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Await `fut` unless `cancel` fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        result = fut => result,
    }
}

/// Drives assistant runs to a terminal state.
///
/// A run is polled until it asks for tool outputs or finishes. Requested tool
/// calls are executed against the function registry and submitted one by one,
/// after which polling resumes. This repeats for as many action rounds as the
/// run requests.
pub struct RunResolver {
    gateway: Arc<dyn AssistantGateway>,
    registry: Arc<FunctionRegistry>,
    poll_interval: Duration,
}

impl RunResolver {
    pub fn new(gateway: Arc<dyn AssistantGateway>, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            gateway,
            registry,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Post `query` to the thread, start a run and drive it to completion.
    ///
    /// Every gateway and function call is abandoned as soon as `cancel` fires.
    #[instrument(skip(self, query, cancel))]
    pub async fn resolve(
        &self,
        thread_id: &str,
        assistant_id: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RelayError> {
        let result = async {
            if !query.is_empty() {
                until_cancelled(cancel, async {
                    self.gateway
                        .add_message(thread_id, query)
                        .await
                        .map_err(RelayError::gateway)
                })
                .await?;
            }
            let run_id = until_cancelled(cancel, self.start_run(thread_id, assistant_id)).await?;
            self.continue_run(thread_id, &run_id, cancel).await
        }
        .await;

        if let Err(e) = &result {
            RunEventLogger::log_event(
                thread_id,
                RunEvent::Error {
                    kind: e.kind().to_string(),
                    error_msg: e.to_string(),
                },
            );
        }
        result
    }

    /// Ask the gateway to start a run of `assistant_id` on the thread.
    pub async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<String, RelayError> {
        let run_id = self
            .gateway
            .create_run(thread_id, assistant_id)
            .await
            .map_err(RelayError::gateway)?;

        info!(thread_id = %thread_id, run_id = %run_id, "Created run");
        Ok(run_id)
    }

    /// Poll the run until it needs tool outputs or reaches a terminal status.
    ///
    /// `queued` and `in_progress` keep polling; `cancelling` is an error.
    /// Cancellation is observed both while waiting for the next tick and while
    /// a status request is in flight.
    pub async fn poll_until_actionable(
        &self,
        thread_id: &str,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Run, RelayError> {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_status = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(run_id = %run_id, "Stopping the poller");
                    return Err(RelayError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            let run = until_cancelled(cancel, async {
                self.gateway
                    .retrieve_run(thread_id, run_id)
                    .await
                    .map_err(RelayError::gateway)
            })
            .await?;

            if last_status != Some(run.status) {
                RunEventLogger::log_event(
                    thread_id,
                    RunEvent::StatusChanged {
                        run_id: run_id.to_string(),
                        status: run.status.to_string(),
                    },
                );
                last_status = Some(run.status);
            }

            match run.status {
                RunStatus::Queued | RunStatus::InProgress => continue,
                RunStatus::Cancelling => return Err(RelayError::UnexpectedStatus(run.status)),
                RunStatus::RequiresAction
                | RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Expired
                | RunStatus::Cancelled
                | RunStatus::Incomplete => return Ok(run),
            }
        }
    }

    /// Execute the run's pending tool calls in order, submitting each output
    /// before moving to the next call.
    ///
    /// The first failure aborts the batch; outputs already submitted stay
    /// submitted. Returns the number of outputs submitted.
    pub async fn dispatch_actions(
        &self,
        thread_id: &str,
        run: &Run,
        cancel: &CancellationToken,
    ) -> Result<usize, RelayError> {
        let mut submitted = 0;

        for call in &run.tool_calls {
            RunEventLogger::log_event(
                thread_id,
                RunEvent::ToolCall {
                    run_id: run.id.clone(),
                    call_id: call.id.clone(),
                    function: call.name.clone(),
                    arguments_json: call.arguments.clone(),
                },
            );

            let output = match until_cancelled(
                cancel,
                self.registry.execute(&call.name, &call.arguments),
            )
            .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!(
                        run_id = %run.id,
                        call_id = %call.id,
                        function = %call.name,
                        error = %e,
                        "Tool call failed, aborting batch"
                    );
                    return Err(e);
                }
            };

            RunEventLogger::log_event(
                thread_id,
                RunEvent::ToolOutput {
                    run_id: run.id.clone(),
                    call_id: call.id.clone(),
                    output_json: output.clone(),
                },
            );

            let outputs = vec![ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            }];
            until_cancelled(cancel, async {
                self.gateway
                    .submit_tool_outputs(thread_id, &run.id, outputs)
                    .await
                    .map_err(RelayError::gateway)
            })
            .await?;
            submitted += 1;
        }

        Ok(submitted)
    }

    /// Keep polling and dispatching until the run completes or fails.
    pub async fn continue_run(
        &self,
        thread_id: &str,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RelayError> {
        let mut action_rounds = 0;

        loop {
            let run = self.poll_until_actionable(thread_id, run_id, cancel).await?;

            match run.status {
                RunStatus::RequiresAction => {
                    let submitted = self.dispatch_actions(thread_id, &run, cancel).await?;
                    action_rounds += 1;
                    debug!(
                        run_id = %run_id,
                        round = action_rounds,
                        submitted,
                        "Action round submitted, resuming polling"
                    );
                }
                RunStatus::Completed => {
                    let reply = until_cancelled(cancel, self.final_reply(thread_id, run_id)).await?;
                    info!(run_id = %run_id, action_rounds, "Run completed");
                    return Ok(RunOutcome {
                        thread_id: thread_id.to_string(),
                        run_id: run_id.to_string(),
                        status: run.status,
                        action_rounds,
                        reply,
                    });
                }
                status => {
                    return Err(RelayError::InvalidRunStatus {
                        status,
                        last_error: run.last_error,
                    })
                }
            }
        }
    }

    /// Latest assistant message the run posted, if any.
    async fn final_reply(&self, thread_id: &str, run_id: &str) -> Result<Option<String>, RelayError> {
        let messages = self
            .gateway
            .list_messages(thread_id, Some(run_id))
            .await
            .map_err(RelayError::gateway)?;

        Ok(messages
            .into_iter()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content))
    }
}
