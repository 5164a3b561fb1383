//! Conversation state.
//!
//! Each browser session owns its own transcript, keyed by the UUID in
//! the `sid` cookie. Transcripts are append-only up to a cap; once the
//! cap is exceeded the oldest messages are dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

/// Maximum number of messages kept per session transcript.
const MAX_MESSAGES: usize = 200;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatRole {
    /// Fixed instruction prepended to every completion request.
    System,
    /// Text submitted through the web form.
    User,
    /// Reply produced by the model (possibly annotated).
    Assistant,
}

/// A single transcript entry.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage {
    /// Message author.
    pub(crate) role: ChatRole,
    /// Message text.
    pub(crate) content: String,
}

impl ChatMessage {
    /// Creates a user message.
    pub(crate) const fn user(content: String) -> Self {
        Self {
            role: ChatRole::User,
            content,
        }
    }

    /// Creates an assistant message.
    pub(crate) const fn assistant(content: String) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
        }
    }
}

/// Per-session transcripts behind a single mutex.
///
/// The lock is only ever held for push/snapshot, never across an await.
#[derive(Debug, Default)]
pub(crate) struct SessionStore {
    /// Session ID → ordered transcript.
    sessions: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

impl SessionStore {
    /// Appends a message to the session transcript, dropping the oldest
    /// entries once [`MAX_MESSAGES`] is exceeded.
    pub(crate) fn push(&self, session: Uuid, message: ChatMessage) {
        let mut sessions = self.lock();
        let transcript = sessions.entry(session).or_default();
        transcript.push(message);
        if transcript.len() > MAX_MESSAGES {
            let excess = transcript.len() - MAX_MESSAGES;
            let _evicted = transcript.drain(..excess);
        }
    }

    /// Returns a copy of the session transcript (empty for unknown sessions).
    pub(crate) fn snapshot(&self, session: Uuid) -> Vec<ChatMessage> {
        self.lock().get(&session).cloned().unwrap_or_default()
    }

    /// Locks the session map, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Vec<ChatMessage>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use uuid::Uuid;

    use super::{ChatMessage, ChatRole, MAX_MESSAGES, SessionStore};

    #[test]
    fn push_preserves_order() {
        let store = SessionStore::default();
        let session = Uuid::new_v4();
        store.push(session, ChatMessage::user("first".to_owned()));
        store.push(session, ChatMessage::assistant("second".to_owned()));

        let transcript = store.snapshot(session);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.first().expect("first entry").role, ChatRole::User);
        assert_eq!(transcript.first().expect("first entry").content, "first");
        assert_eq!(transcript.last().expect("last entry").role, ChatRole::Assistant);
        assert_eq!(transcript.last().expect("last entry").content, "second");
    }

    #[test]
    fn unknown_session_is_empty() {
        let store = SessionStore::default();
        assert!(store.snapshot(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.push(alice, ChatMessage::user("alice speaks".to_owned()));
        store.push(bob, ChatMessage::user("bob speaks".to_owned()));

        let alice_transcript = store.snapshot(alice);
        assert_eq!(alice_transcript.len(), 1);
        assert_eq!(
            alice_transcript.first().expect("entry").content,
            "alice speaks"
        );
        let bob_transcript = store.snapshot(bob);
        assert_eq!(bob_transcript.len(), 1);
        assert_eq!(bob_transcript.first().expect("entry").content, "bob speaks");
    }

    #[test]
    fn cap_drops_oldest() {
        let store = SessionStore::default();
        let session = Uuid::new_v4();
        for index in 0..=MAX_MESSAGES {
            store.push(session, ChatMessage::user(format!("message {index}")));
        }

        let transcript = store.snapshot(session);
        assert_eq!(transcript.len(), MAX_MESSAGES);
        assert_eq!(transcript.first().expect("entry").content, "message 1");
        assert_eq!(
            transcript.last().expect("entry").content,
            format!("message {MAX_MESSAGES}")
        );
    }
}
