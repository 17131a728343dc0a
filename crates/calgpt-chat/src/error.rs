//! Error types for conversation state.

/// Errors from the conversation store.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("session limit of {0} reached")]
    SessionLimit(usize),
    #[error("storage error: {0}")]
    StorageError(String),
}
