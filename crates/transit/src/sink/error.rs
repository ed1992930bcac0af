//! Sink error types.

use thiserror::Error;

/// Errors that can occur when talking to the JSON-RPC sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Login was refused or could not be performed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The sink answered with an error envelope.
    #[error("RPC error{}: {message}", code_suffix(.code))]
    Rpc { code: Option<i64>, message: String },

    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    /// The response body was not a JSON-RPC envelope.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope carried a result of an unexpected shape.
    #[error("Unexpected result from {method}: {result}")]
    UnexpectedResult { method: String, result: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SinkError {
    /// HTTP 429 from the sink endpoint.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SinkError::Status { status: 429, .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, SinkError::Authentication(_))
    }
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

/// Get a short error message suitable for progress output.
pub fn short_error_message(err: &SinkError) -> String {
    match err {
        SinkError::Authentication(_) => "Authentication failed".to_string(),
        SinkError::Rpc { message, .. } => {
            let first = message.lines().next().unwrap_or(message.as_str());
            if first.chars().count() > 60 {
                let truncated: String = first.chars().take(57).collect();
                format!("{}...", truncated)
            } else {
                first.to_string()
            }
        }
        SinkError::Http(_) => "Network error".to_string(),
        SinkError::Status { status, .. } => format!("HTTP {}", status),
        SinkError::Json(_) => "JSON parse error".to_string(),
        SinkError::UnexpectedResult { method, .. } => format!("Unexpected {} result", method),
        SinkError::Internal(msg) => msg.clone(),
    }
}
