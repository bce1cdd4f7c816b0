//! Readiness Evaluator
//!
//! Decides whether a conversation has gathered enough to ask the
//! recommendation service for cards:
//! - at least one category holds a positive amount, and
//! - the user has voiced at least one recognised card intent.

use crate::conversation::{user_messages, ConversationTurn};
use crate::spending::SpendingRecord;

/// Card intents a user can state
pub const INTENT_KEYWORDS: &[&str] = &[
    "travel", "reward", "cashback", "student", "business", "fuel", "dining",
];

/// Readiness evaluator
pub struct ReadinessEvaluator;

impl ReadinessEvaluator {
    /// Pure function of the accumulated record and the conversation.
    ///
    /// The intent scan covers the user's side of the conversation only, not
    /// the whole transcript: assistant replies routinely mention rewards and
    /// would make every conversation look ready. Callers mid-turn must check
    /// the pending user message themselves, since it is not in `history` yet.
    pub fn is_ready(accumulated: &SpendingRecord, history: &[ConversationTurn]) -> bool {
        if !accumulated.has_positive_amount() {
            return false;
        }

        user_messages(history).any(|text| !detect_intents(text).is_empty())
    }
}

/// Intent keywords present in a piece of text, in keyword-list order
pub fn detect_intents(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    INTENT_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| lowered.contains(kw))
        .collect()
}
