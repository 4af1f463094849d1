use thiserror::Error;

use crate::types::RunStatus;

/// Errors raised while executing functions and resolving assistant runs.
///
/// Every kind surfaces unchanged to the request layer; nothing here is retried
/// or rolled back locally.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("function '{0}' is not registered")]
    FunctionNotFound(String),

    #[error("malformed input for function '{function}': {source}")]
    MalformedInput {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("function '{function}' failed: {message}")]
    Execution { function: String, message: String },

    #[error("failed to serialize output of function '{function}': {source}")]
    Serialization {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("assistant gateway error: {0}")]
    Gateway(String),

    #[error("unexpected run status: {0}")]
    UnexpectedStatus(RunStatus),

    #[error("invalid run status {status}{}", detail(.last_error))]
    InvalidRunStatus {
        status: RunStatus,
        last_error: Option<String>,
    },

    #[error("run resolution cancelled")]
    Cancelled,
}

fn detail(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(": {e}"))
        .unwrap_or_default()
}

impl RelayError {
    /// Wrap a failed gateway call, keeping the full context chain in the message.
    pub fn gateway(err: anyhow::Error) -> Self {
        Self::Gateway(format!("{err:#}"))
    }

    /// Short machine-readable name of the error kind, used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FunctionNotFound(_) => "not_found",
            Self::MalformedInput { .. } => "malformed_input",
            Self::Execution { .. } => "execution_error",
            Self::Serialization { .. } => "serialization_error",
            Self::Gateway(_) => "gateway_error",
            Self::UnexpectedStatus(_) => "unexpected_status",
            Self::InvalidRunStatus { .. } => "invalid_run_status",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_status_message_includes_last_error() {
        let err = RelayError::InvalidRunStatus {
            status: RunStatus::Failed,
            last_error: Some("rate limited".into()),
        };
        assert_eq!(err.to_string(), "invalid run status failed: rate limited");

        let err = RelayError::InvalidRunStatus {
            status: RunStatus::Expired,
            last_error: None,
        };
        assert_eq!(err.to_string(), "invalid run status expired");
    }

    #[test]
    fn test_gateway_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("retrieve run failed");
        let err = RelayError::gateway(err);
        assert_eq!(err.kind(), "gateway_error");
        assert!(err.to_string().contains("retrieve run failed: connection reset"));
    }
}
