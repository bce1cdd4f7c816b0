//! Conversation turns and history windowing
//!
//! The session lives on the client: every request carries the ordered
//! history back. Nothing here is persisted server-side.

use crate::spending::SpendingRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Spending extracted on this turn (assistant turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_data: Option<SpendingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            spending_data: None,
            follow_up_question: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        spending_data: Option<SpendingRecord>,
        follow_up_question: Option<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            spending_data,
            follow_up_question,
            timestamp: Utc::now(),
        }
    }
}

/// Iterate over the text the user has typed so far, oldest first
pub fn user_messages(history: &[ConversationTurn]) -> impl Iterator<Item = &str> {
    history
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
}

/// Keeps the tail of a conversation small enough to forward to the
/// completion service on every turn.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow {
    max_turns: usize,
}

impl HistoryWindow {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Most recent `max_turns` turns, in original order
    pub fn recent<'a>(&self, history: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        let start = history.len().saturating_sub(self.max_turns);
        &history[start..]
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_deserializes_without_timestamp() {
        let turn: ConversationTurn = serde_json::from_value(json!({
            "role": "assistant",
            "content": "Got it, 20k on rent.",
            "spending_data": { "rent": 20000, "unknown_key": 1 },
            "follow_up_question": "How much on Amazon?"
        }))
        .unwrap();

        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.spending_data.unwrap().len(), 1);
        assert_eq!(turn.follow_up_question.as_deref(), Some("How much on Amazon?"));
    }

    #[test]
    fn test_user_messages_skip_assistant() {
        let history = vec![
            ConversationTurn::user("I pay rent"),
            ConversationTurn::assistant("How much rewards do you want?", None, None),
            ConversationTurn::user("20k"),
        ];
        let texts: Vec<_> = user_messages(&history).collect();
        assert_eq!(texts, vec!["I pay rent", "20k"]);
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let history: Vec<_> = (0..10)
            .map(|i| ConversationTurn::user(format!("Message {}", i)))
            .collect();

        let window = HistoryWindow::new(3);
        let recent = window.recent(&history);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "Message 7");

        let short = &history[..2];
        assert_eq!(window.recent(short).len(), 2);
    }
}
