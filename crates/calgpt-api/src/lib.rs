//! CalGPT API crate - axum HTTP server and route handlers.
//!
//! Exposes the one-shot query endpoint, conversation sessions that track the
//! displayed course list, and a health check.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
