//! Shared types, configuration and errors for CalGPT.

pub mod config;
pub mod error;
pub mod types;

pub use config::CalgptConfig;
pub use error::{CalgptError, Result};
pub use types::*;
