//! Error types for the query bridge.

use std::time::Duration;

/// Errors from invoking the answering process.
///
/// An output that cannot be decoded as an answer object is not an error: the
/// parser falls back to a plain-text answer.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("query process failed ({}): {stderr}", describe_exit(.code))]
    ProcessFailed { code: Option<i32>, stderr: String },
    #[error("query process timed out after {0:?}")]
    TimedOut(Duration),
    #[error("too many queries in progress, try again shortly")]
    Saturated,
    #[error("process i/o error: {0}")]
    Io(String),
    #[error("failed to encode process input: {0}")]
    Encode(String),
}

impl BridgeError {
    /// Text suitable for the `{ error }` body returned to clients.
    ///
    /// A failed process reports its stderr verbatim. When stderr is empty a
    /// fixed message is used; the exit status only goes to the logs.
    pub fn client_message(&self) -> String {
        match self {
            BridgeError::ProcessFailed { stderr, .. } if stderr.is_empty() => {
                PROCESS_FAILED_MESSAGE.to_string()
            }
            BridgeError::ProcessFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Client-facing message for a failed process that wrote nothing to stderr.
pub const PROCESS_FAILED_MESSAGE: &str = "query process failed";

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
