use thiserror::Error;

/// Top-level error type for CalGPT.
///
/// Subsystem crates define their own error types (`BridgeError`, `ChatError`);
/// the API layer maps each of them, and this one, to a response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CalgptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CalgptError {
    fn from(err: toml::de::Error) -> Self {
        CalgptError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CalgptError {
    fn from(err: serde_json::Error) -> Self {
        CalgptError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for CalGPT operations.
pub type Result<T> = std::result::Result<T, CalgptError>;
