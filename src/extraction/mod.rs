//! Extractor trait and implementations
//!
//! An extractor turns one free-text user message into a partial spending
//! record, a reply, and an optional follow-up question. Merging into the
//! accumulated record, readiness, and caching happen in the agent.

use crate::conversation::ConversationTurn;
use crate::models::Extraction;
use crate::spending::SpendingRecord;
use crate::Result;
use async_trait::async_trait;

pub mod heuristic;
pub mod llm;

pub use heuristic::HeuristicExtractor;
pub use llm::LlmExtractor;

/// Reply used when the completion could not be understood
pub const APOLOGY_REPLY: &str =
    "Sorry, I couldn't understand that. Could you rephrase your spending details?";

/// Trait for spending extraction
#[async_trait]
pub trait SpendingExtractor: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Extract the spending mentioned in `message`.
    ///
    /// `accumulated` is what is already known; implementations may use it to
    /// avoid re-asking, but must only return categories from this message.
    async fn extract(
        &self,
        message: &str,
        history: &[ConversationTurn],
        accumulated: &SpendingRecord,
    ) -> Result<Extraction>;
}
