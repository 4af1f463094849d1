//! Conversational entry point (`POST /detectIntent`).
//!
//! Finds or creates the caller's thread, then resolves one assistant run on a
//! dedicated task. The task is cancelled when the client goes away or the
//! request deadline passes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use runrelay_core::RelayError;

use crate::server::GatewayState;

/// How long a cancelled run may take to wind down before it is aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectIntentRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub query: String,
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Handler for `POST /detectIntent`.
pub async fn detect_intent(
    State(state): State<GatewayState>,
    payload: Result<Json<DetectIntentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Failed to decode request");
            return failure(StatusCode::BAD_REQUEST, "invalid request body");
        }
    };

    let thread_id = match thread_for_session(&state, &request.session_id).await {
        Ok(thread_id) => thread_id,
        Err(e) => {
            error!(session = %request.session_id, kind = e.kind(), error = %e, "Failed to get or create thread");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "failed to process request");
        }
    };

    // Dropping this handler (client disconnect) cancels the resolution task.
    let cancel = CancellationToken::new();
    let _disconnect_guard = cancel.clone().drop_guard();

    let resolver = Arc::clone(&state.resolver);
    let assistant_id = Arc::clone(&state.assistant_id);
    let task_cancel = cancel.clone();
    let task_thread = thread_id.clone();
    let mut task = tokio::spawn(async move {
        resolver
            .resolve(&task_thread, &assistant_id, &request.query, &task_cancel)
            .await
    });

    let joined = match tokio::time::timeout(state.request_timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(thread_id = %thread_id, timeout = ?state.request_timeout, "Request deadline exceeded, cancelling run");
            cancel.cancel();
            match tokio::time::timeout(CANCEL_GRACE, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    error!(thread_id = %thread_id, "Run resolution did not stop after cancellation, aborted");
                    return failure(StatusCode::INTERNAL_SERVER_ERROR, "failed to process request");
                }
            }
        }
    };

    match joined {
        Ok(Ok(outcome)) => {
            info!(
                thread_id = %outcome.thread_id,
                run_id = %outcome.run_id,
                action_rounds = outcome.action_rounds,
                "Request resolved"
            );
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Ok(Err(e)) => {
            error!(thread_id = %thread_id, kind = e.kind(), error = %e, "Run resolution failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "failed to process request")
        }
        Err(e) => {
            error!(thread_id = %thread_id, error = %e, "Run resolution task aborted");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "failed to process request")
        }
    }
}

/// Thread bound to the session, creating one on a miss.
///
/// An empty session id carries no affinity: it always gets a fresh thread
/// that is not remembered.
async fn thread_for_session(state: &GatewayState, session_id: &str) -> Result<String, RelayError> {
    if !session_id.is_empty() {
        if let Some(thread_id) = state.sessions.get(session_id).await {
            return Ok(thread_id);
        }
    }

    let thread_id = state
        .gateway
        .create_thread()
        .await
        .map_err(RelayError::gateway)?;
    info!(session = %session_id, thread_id = %thread_id, "Created thread");

    if session_id.is_empty() {
        return Ok(thread_id);
    }
    Ok(state.sessions.get_or_insert(session_id, thread_id).await)
}
