//! Completion-backed extractor
//!
//! Prompts an external completion service for a JSON object of the form
//! `{"message": ..., "spending_data": {...}, "follow_up_question": ...}`
//! and validates whatever comes back.

use super::SpendingExtractor;
use crate::completion::{CompletionMessage, CompletionService};
use crate::config::ExtractorConfig;
use crate::conversation::{ConversationTurn, HistoryWindow};
use crate::error::AdvisorError;
use crate::models::Extraction;
use crate::spending::{Cadence, SpendingCategory, SpendingRecord, ValidationReport};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct LlmExtractor {
    completion: Arc<dyn CompletionService>,
    config: ExtractorConfig,
    window: HistoryWindow,
}

impl LlmExtractor {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        config: ExtractorConfig,
        window: HistoryWindow,
    ) -> Self {
        Self {
            completion,
            config,
            window,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn build_messages(
        &self,
        message: &str,
        history: &[ConversationTurn],
        accumulated: &SpendingRecord,
    ) -> Vec<CompletionMessage> {
        let recent = self.window.recent(history);
        let mut messages = Vec::with_capacity(recent.len() + 2);

        messages.push(CompletionMessage::new(
            "system",
            build_system_prompt(accumulated),
        ));
        for turn in recent {
            messages.push(CompletionMessage::new(turn.role.as_str(), turn.content.clone()));
        }
        messages.push(CompletionMessage::new("user", message));

        messages
    }
}

#[async_trait]
impl SpendingExtractor for LlmExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(
        &self,
        message: &str,
        history: &[ConversationTurn],
        accumulated: &SpendingRecord,
    ) -> Result<Extraction> {
        let messages = self.build_messages(message, history, accumulated);
        debug!(messages = messages.len(), "Built extraction prompt");

        let raw = self.completion.complete_json(messages, &self.config).await?;
        parse_completion(&raw)
    }
}

/// Build the fixed instruction prompt listing every known key
fn build_system_prompt(accumulated: &SpendingRecord) -> String {
    let keys_for = |cadence: Cadence| {
        SpendingCategory::ALL
            .iter()
            .filter(|c| c.cadence() == cadence)
            .map(|c| c.key())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let known = if accumulated.is_empty() {
        "nothing yet".to_string()
    } else {
        serde_json::to_string(accumulated).unwrap_or_else(|_| "{}".to_string())
    };

    format!(
        r#"You are a helpful assistant for CardGenius, a credit card recommendation service. Extract spending amounts from the user's latest message and ask a short follow-up question.

Rules:
- Extract numeric amounts in rupees (20k = 20000, 2 lakh = 200000).
- Only use these keys.
  Monthly amounts: {monthly}
  Annual amounts: {annual}
  Visits per quarter: {quarterly}
- Convert amounts to the cadence of the key (50k per month on flights = 600000 for flights_annual).
- Only include categories the user mentioned in the latest message. Leave everything else out.
- Use 0 only when the user says they spend nothing on a category.
- Ask about categories the user mentioned without an amount, or about their card preference (travel, rewards, cashback, fuel, dining).
- Be friendly and brief.

Already known: {known}

Respond with a JSON object only:
{{
  "message": "string",
  "spending_data": {{ "category_key": number }},
  "follow_up_question": "string or null"
}}"#,
        monthly = keys_for(Cadence::Monthly),
        annual = keys_for(Cadence::Annual),
        quarterly = keys_for(Cadence::Quarterly),
        known = known,
    )
}

/// Strip an optional markdown fence, then fall back to the outermost braces
fn json_body(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_lang = after_fence
            .strip_prefix("json")
            .unwrap_or(after_fence);
        if let Some(end) = after_lang.find("```") {
            return after_lang[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Validate a completion into an [`Extraction`].
///
/// Shape problems (not JSON, not an object, no `message`) fail the turn with
/// [`AdvisorError::ExtractionFormat`]. Field problems inside `spending_data`
/// are corrected in place and counted.
pub fn parse_completion(raw: &str) -> Result<Extraction> {
    let parsed: Value = serde_json::from_str(json_body(raw)).map_err(|e| {
        warn!("Completion was not JSON: {}", e);
        AdvisorError::ExtractionFormat(format!("completion is not JSON: {}", e))
    })?;

    let Value::Object(obj) = parsed else {
        return Err(AdvisorError::ExtractionFormat(
            "completion is not a JSON object".to_string(),
        ));
    };

    let reply = obj
        .get("message")
        .or_else(|| obj.get("reply"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AdvisorError::ExtractionFormat("completion has no 'message' string".to_string())
        })?
        .to_string();

    let (delta, validation) = match obj.get("spending_data") {
        Some(Value::Object(map)) => SpendingRecord::from_untrusted(map),
        None | Some(Value::Null) => (SpendingRecord::new(), ValidationReport::default()),
        Some(_) => (
            SpendingRecord::new(),
            ValidationReport {
                dropped_unknown: 0,
                coerced_invalid: 1,
            },
        ),
    };

    if !validation.is_clean() {
        warn!(
            dropped_unknown = validation.dropped_unknown,
            coerced_invalid = validation.coerced_invalid,
            "Corrected malformed spending fields from completion"
        );
    }

    let follow_up = obj
        .get("follow_up_question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Extraction {
        reply,
        delta,
        follow_up,
        validation,
    })
}
