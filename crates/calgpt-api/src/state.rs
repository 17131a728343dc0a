//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use calgpt_bridge::{Admission, OutputParser, ProcessInvoker};
use calgpt_chat::ConversationStore;
use calgpt_core::config::CalgptConfig;

/// Shared application state.
///
/// All fields are cheap to clone. Nothing here is mutated per query except
/// the conversation store, which guards itself.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup.
    pub config: Arc<CalgptConfig>,
    /// Spawns the answering process.
    pub invoker: Arc<ProcessInvoker>,
    /// Classifies process output.
    pub parser: Arc<OutputParser>,
    /// Bounds concurrent subprocesses.
    pub admission: Admission,
    /// Conversation sessions.
    pub store: Arc<ConversationStore>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Build every component from `config`.
    pub fn new(config: CalgptConfig) -> Self {
        let invoker = ProcessInvoker::from_config(&config.bridge);
        Self::with_invoker(config, invoker)
    }

    /// Like [`AppState::new`] but with an explicitly constructed invoker.
    pub fn with_invoker(config: CalgptConfig, invoker: ProcessInvoker) -> Self {
        Self {
            invoker: Arc::new(invoker),
            parser: Arc::new(OutputParser::from_config(&config.parser)),
            admission: Admission::from_config(&config.bridge),
            store: Arc::new(ConversationStore::from_config(&config.sessions)),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}
