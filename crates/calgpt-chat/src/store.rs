//! Per-session conversation store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info};
use uuid::Uuid;

use calgpt_core::config::SessionConfig;

use crate::conversation::Conversation;
use crate::error::ChatError;

/// In-memory conversations keyed by session id.
///
/// The lock is only held for the duration of a synchronous closure, so it is
/// never held across an `.await`.
pub struct ConversationStore {
    sessions: Mutex<HashMap<Uuid, Conversation>>,
    max_sessions: usize,
    timeout_minutes: u32,
}

impl ConversationStore {
    pub fn new(max_sessions: usize, timeout_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            timeout_minutes,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_sessions, config.timeout_minutes)
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Conversation>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::StorageError(format!("session lock poisoned: {}", e)))
    }

    /// Start a new empty conversation.
    ///
    /// Expired sessions are purged first when the store is full.
    pub fn create(&self) -> Result<Uuid, ChatError> {
        let mut sessions = self.lock()?;
        if sessions.len() >= self.max_sessions {
            let timeout = self.timeout_minutes;
            sessions.retain(|_, convo| !convo.is_expired(timeout));
            if sessions.len() >= self.max_sessions {
                return Err(ChatError::SessionLimit(self.max_sessions));
            }
        }
        let id = Uuid::new_v4();
        sessions.insert(id, Conversation::new());
        debug!(session_id = %id, active = sessions.len(), "Created session");
        Ok(id)
    }

    /// Snapshot of a live conversation.
    pub fn get(&self, id: Uuid) -> Result<Conversation, ChatError> {
        self.update(id, |convo| convo.clone())
    }

    /// Run `f` against a live conversation under the lock.
    ///
    /// An expired conversation is removed and reported as not found.
    pub fn update<F, R>(&self, id: Uuid, f: F) -> Result<R, ChatError>
    where
        F: FnOnce(&mut Conversation) -> R,
    {
        let mut sessions = self.lock()?;
        let expired = match sessions.get(&id) {
            Some(convo) => convo.is_expired(self.timeout_minutes),
            None => return Err(ChatError::SessionNotFound(id)),
        };
        if expired {
            sessions.remove(&id);
            debug!(session_id = %id, "Dropped expired session on access");
            return Err(ChatError::SessionNotFound(id));
        }
        sessions
            .get_mut(&id)
            .map(f)
            .ok_or(ChatError::SessionNotFound(id))
    }

    pub fn delete(&self, id: Uuid) -> Result<(), ChatError> {
        let mut sessions = self.lock()?;
        match sessions.remove(&id) {
            Some(_) => {
                debug!(session_id = %id, "Deleted session");
                Ok(())
            }
            None => Err(ChatError::SessionNotFound(id)),
        }
    }

    /// Remove idle conversations. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(e) => {
                error!("Session lock poisoned: {}", e);
                return 0;
            }
        };
        let before = sessions.len();
        let timeout = self.timeout_minutes;
        sessions.retain(|_, convo| !convo.is_expired(timeout));
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, remaining = sessions.len(), "Purged expired sessions");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
