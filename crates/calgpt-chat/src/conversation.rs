//! Conversation state and the displayed-courses projection.
//!
//! Messages are append-only. The projection always equals the courses of the
//! newest assistant message by timestamp, and is empty when that message has
//! none. It is maintained incrementally: each append is compared against the
//! newest assistant timestamp seen so far, which only ever grows, so the
//! result is the same as scanning the history backwards after every append.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use calgpt_core::types::{CourseRecord, HistoryTurn, ParsedAnswer, Sender};

use crate::error::ChatError;

// =============================================================================
// Message
// =============================================================================

/// One entry in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// `None` when the message carries no courses; never an empty list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<CourseRecord>>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            courses: None,
            timestamp,
        }
    }

    pub fn assistant(
        text: impl Into<String>,
        courses: Vec<CourseRecord>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            courses: if courses.is_empty() { None } else { Some(courses) },
            timestamp,
        }
    }

    pub fn from_answer(answer: ParsedAnswer, timestamp: DateTime<Utc>) -> Self {
        let (text, courses) = answer.into_parts();
        Self::assistant(text, courses, timestamp)
    }

    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Ordered message history plus the derived displayed-courses state.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    displayed_courses: Vec<CourseRecord>,
    latest_assistant: Option<usize>,
    latest_seen: Option<DateTime<Utc>>,
    /// Newest timestamp of any recorded message, assistant or user.
    newest: Option<DateTime<Utc>>,
    pub(crate) last_activity: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            displayed_courses: Vec::new(),
            latest_assistant: None,
            latest_seen: None,
            newest: None,
            last_activity: Utc::now(),
        }
    }

    /// Append `message` and update the projection.
    ///
    /// Returns `true` if the message became the newest assistant message.
    /// Messages arriving out of timestamp order are recorded but do not
    /// displace a newer assistant message.
    pub fn append(&mut self, message: Message) -> bool {
        let becomes_latest = message.is_assistant()
            && match self.latest_seen {
                Some(seen) => message.timestamp > seen,
                None => true,
            };

        if becomes_latest {
            self.latest_seen = Some(message.timestamp);
            self.latest_assistant = Some(self.messages.len());
            self.displayed_courses = message.courses.clone().unwrap_or_default();
        }

        self.newest = match self.newest {
            Some(newest) if newest >= message.timestamp => Some(newest),
            _ => Some(message.timestamp),
        };
        self.messages.push(message);
        self.last_activity = Utc::now();
        becomes_latest
    }

    /// Append a user message stamped after everything already recorded.
    pub fn push_user(&mut self, text: &str) -> Result<&Message, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let message = Message::user(text, self.next_timestamp());
        Ok(self.push(message))
    }

    /// Append the assistant's answer stamped after everything already recorded.
    pub fn push_assistant(&mut self, answer: ParsedAnswer) -> &Message {
        let message = Message::from_answer(answer, self.next_timestamp());
        self.push(message)
    }

    /// Record a failed query as an assistant message without courses.
    pub fn push_error(&mut self, error: &str) -> &Message {
        let message = Message::assistant(
            format!("Error: {}", error),
            Vec::new(),
            self.next_timestamp(),
        );
        self.push(message)
    }

    fn push(&mut self, message: Message) -> &Message {
        self.append(message);
        &self.messages[self.messages.len() - 1]
    }

    /// `now`, or one microsecond past the newest recorded timestamp if the
    /// clock has not moved past it.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.newest {
            Some(newest) if now <= newest => newest + Duration::microseconds(1),
            _ => now,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn displayed_courses(&self) -> &[CourseRecord] {
        &self.displayed_courses
    }

    /// Timestamp of the newest assistant message, if any.
    pub fn latest_seen(&self) -> Option<DateTime<Utc>> {
        self.latest_seen
    }

    pub fn latest_assistant(&self) -> Option<&Message> {
        self.latest_assistant.map(|idx| &self.messages[idx])
    }

    /// The history in the shape forwarded to the answering process.
    pub fn to_history_turns(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .map(|m| HistoryTurn {
                sender: m.sender,
                text: m.text.clone(),
            })
            .collect()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Whether the conversation has been idle longer than `timeout_minutes`.
    pub fn is_expired(&self, timeout_minutes: u32) -> bool {
        Utc::now() - self.last_activity > Duration::minutes(i64::from(timeout_minutes))
    }
}
