//! Conversation state for one companion session.
//!
//! Holds the ordered message list, the loading flag and the user-visible error slot.
//! Owned by a single writer (the controller task), so it is a plain struct with no
//! interior locking. Message ids come from a counter owned by the session.

use serde::{Deserialize, Serialize};

/// Opaque message id, strictly increasing within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

/// Wire form of a history entry (`{role, content}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Snapshot of the session as the renderer sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Ordered messages plus loading/error flags.
#[derive(Debug, Default)]
pub struct SessionState {
    messages: Vec<Message>,
    loading: bool,
    error: Option<String>,
    next_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId(self.next_id)
    }

    fn push(&mut self, role: Role, content: String) -> MessageId {
        let id = self.issue_id();
        self.messages.push(Message { id, role, content });
        id
    }

    /// Append a user message; returns its id.
    pub fn append_user(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Role::User, text.into())
    }

    /// Append an empty assistant message to be filled by a stream; returns its id.
    pub fn append_assistant_placeholder(&mut self) -> MessageId {
        self.push(Role::Assistant, String::new())
    }

    /// Apply `f` to the message with `id`. Returns false when the id is unknown.
    pub fn mutate(&mut self, id: MessageId, f: impl FnOnce(&mut Message)) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                f(m);
                true
            }
            None => false,
        }
    }

    /// Remove the message with `id`. Removing an unknown or already-removed id is a no-op.
    pub fn remove(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Most recent `limit` messages with non-empty content, oldest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let mut recent: Vec<HistoryEntry> = self
            .messages
            .iter()
            .rev()
            .filter(|m| !m.content.is_empty())
            .take(limit)
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        recent.reverse();
        recent
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            messages: self.messages.clone(),
            loading: self.loading,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_and_are_not_reused() {
        let mut s = SessionState::new();
        let a = s.append_user("hi");
        let b = s.append_assistant_placeholder();
        assert!(b > a);
        assert!(s.remove(b));
        let c = s.append_assistant_placeholder();
        assert!(c > b);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut s = SessionState::new();
        let id = s.append_assistant_placeholder();
        assert!(s.remove(id));
        assert!(!s.remove(id));
        assert!(s.messages().is_empty());
    }

    #[test]
    fn mutate_unknown_id_is_noop() {
        let mut s = SessionState::new();
        s.append_user("hello");
        assert!(!s.mutate(MessageId(42), |m| m.content.push('x')));
        assert_eq!(s.messages()[0].content, "hello");
    }

    #[test]
    fn history_skips_empty_and_keeps_last_six_in_order() {
        let mut s = SessionState::new();
        for i in 0..5 {
            s.append_user(format!("u{}", i));
            let id = s.append_assistant_placeholder();
            s.mutate(id, |m| m.content = format!("a{}", i));
        }
        s.append_assistant_placeholder();

        let h = s.history(6);
        let contents: Vec<&str> = h.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["u2", "a2", "u3", "a3", "u4", "a4"]);
        assert_eq!(h[0].role, Role::User);
        assert_eq!(h[1].role, Role::Assistant);
    }

    #[test]
    fn history_entry_wire_shape() {
        let e = HistoryEntry {
            role: Role::Assistant,
            content: "ok".to_string(),
        };
        assert_eq!(
            serde_json::to_value(e).unwrap(),
            serde_json::json!({"role": "assistant", "content": "ok"})
        );
    }
}
