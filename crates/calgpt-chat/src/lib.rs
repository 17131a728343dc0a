//! Conversation state for CalGPT.
//!
//! Keeps the message history of each chat session and derives which course
//! list is currently on display from it.

pub mod conversation;
pub mod error;
pub mod store;

pub use conversation::{Conversation, Message};
pub use error::ChatError;
pub use store::ConversationStore;
