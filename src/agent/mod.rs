//! Turn orchestrator
//!
//! MESSAGE → CACHE? → EXTRACT → MERGE → READY? → RECOMMEND → RESPOND

use crate::cache::{cache_key, ResponseCache};
use crate::completion::OpenAiCompletionClient;
use crate::config::{AppConfig, ExtractorMode};
use crate::conversation::{ConversationTurn, HistoryWindow};
use crate::error::AdvisorError;
use crate::extraction::{HeuristicExtractor, LlmExtractor, SpendingExtractor, APOLOGY_REPLY};
use crate::gateway::{CardGeniusGateway, RecommendationService};
use crate::models::{ChatTurnResponse, ExtractionOutcome, RecommendationResult};
use crate::readiness::{detect_intents, ReadinessEvaluator};
use crate::spending::SpendingRecord;
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

struct ExtractionStep {
    key: String,
    outcome: ExtractionOutcome,
    cached: bool,
}

/// Runs chat turns against an extractor and a recommendation service
pub struct CardAgent {
    extractor: Arc<dyn SpendingExtractor>,
    gateway: Arc<dyn RecommendationService>,
    cache: ResponseCache<ExtractionOutcome>,
}

impl CardAgent {
    pub fn new(
        extractor: Arc<dyn SpendingExtractor>,
        gateway: Arc<dyn RecommendationService>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            extractor,
            gateway,
            cache: ResponseCache::new(cache_ttl),
        }
    }

    /// Wire the production services from configuration.
    ///
    /// Falls back to the heuristic extractor when no completion key is set.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let extractor: Arc<dyn SpendingExtractor> = match (
            config.extractor_mode,
            config.completion_api_key.as_ref(),
        ) {
            (ExtractorMode::Llm, Some(api_key)) => {
                let client = OpenAiCompletionClient::new(
                    api_key.clone(),
                    config.completion_base_url.clone(),
                    config.completion_timeout,
                )?;
                Arc::new(LlmExtractor::new(
                    Arc::new(client),
                    config.extractor.clone(),
                    HistoryWindow::new(config.history_window),
                ))
            }
            (ExtractorMode::Llm, None) => {
                warn!("OPENAI_API_KEY not set; using the heuristic extractor");
                Arc::new(HeuristicExtractor::new())
            }
            (ExtractorMode::Heuristic, _) => Arc::new(HeuristicExtractor::new()),
        };

        let gateway = CardGeniusGateway::new(
            config.recommendation_url.clone(),
            config.gateway_timeout,
        )?;

        info!(
            extractor = extractor.name(),
            recommendation_url = %config.recommendation_url,
            "Card agent configured"
        );

        Ok(Self::new(extractor, Arc::new(gateway), config.cache_ttl))
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn gateway(&self) -> Arc<dyn RecommendationService> {
        Arc::clone(&self.gateway)
    }

    /// Extract, merge and evaluate readiness for one message.
    ///
    /// Identical inputs within the cache TTL return the stored outcome
    /// without calling the extractor.
    pub async fn extract(
        &self,
        message: &str,
        history: &[ConversationTurn],
        accumulated: &SpendingRecord,
    ) -> Result<ExtractionOutcome> {
        let step = self.resolve(message, history, accumulated).await?;
        Ok(self.commit(step).await)
    }

    async fn resolve(
        &self,
        message: &str,
        history: &[ConversationTurn],
        accumulated: &SpendingRecord,
    ) -> Result<ExtractionStep> {
        let key = cache_key(message, history, accumulated);
        if let Some(cached) = self.cache.get(&key).await {
            debug!("Extraction cache hit");
            return Ok(ExtractionStep {
                key,
                outcome: cached,
                cached: true,
            });
        }

        let extraction = self.extractor.extract(message, history, accumulated).await?;
        let spending_data = accumulated.merged(&extraction.delta);

        // The current message is not in the history yet
        let ready = ReadinessEvaluator::is_ready(&spending_data, history)
            || (spending_data.has_positive_amount() && !detect_intents(message).is_empty());

        Ok(ExtractionStep {
            key,
            outcome: ExtractionOutcome {
                reply: extraction.reply,
                delta: extraction.delta,
                spending_data,
                follow_up_question: extraction.follow_up,
                ready,
                validation: extraction.validation,
            },
            cached: false,
        })
    }

    /// Store a freshly computed outcome and hand it back
    async fn commit(&self, step: ExtractionStep) -> ExtractionOutcome {
        if !step.cached {
            self.cache.insert(step.key, step.outcome.clone()).await;
        }
        step.outcome
    }

    /// Run one full chat turn.
    ///
    /// Unreadable completions become an apology; recommendation failures
    /// other than timeouts leave `recommendations` empty. The extraction is
    /// cached only once the turn has succeeded.
    pub async fn chat_turn(
        &self,
        message: &str,
        history: &[ConversationTurn],
        accumulated: &SpendingRecord,
    ) -> Result<ChatTurnResponse> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AdvisorError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }

        let span = info_span!(
            "chat_turn",
            turn_id = %Uuid::new_v4(),
            extractor = self.extractor.name()
        );

        async move {
            let start = Instant::now();

            let step = match self.resolve(message, history, accumulated).await {
                Ok(step) => step,
                Err(AdvisorError::ExtractionFormat(detail)) => {
                    warn!(detail = %detail, "Could not read extraction; asking user to rephrase");
                    return Ok(ChatTurnResponse {
                        reply: APOLOGY_REPLY.to_string(),
                        spending_data: accumulated.clone(),
                        follow_up_question: None,
                        ready: false,
                        recommendations: None,
                    });
                }
                Err(e) => return Err(e),
            };

            let recommendations = if step.outcome.ready {
                self.recommend(&step.outcome.spending_data).await?
            } else {
                None
            };
            let outcome = self.commit(step).await;

            info!(
                captured = outcome.delta.len(),
                total = outcome.spending_data.len(),
                ready = outcome.ready,
                cards = recommendations.as_ref().map(|r| r.savings.len()).unwrap_or(0),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Chat turn complete"
            );

            Ok(ChatTurnResponse {
                reply: outcome.reply,
                spending_data: outcome.spending_data,
                follow_up_question: outcome.follow_up_question,
                ready: outcome.ready,
                recommendations,
            })
        }
        .instrument(span)
        .await
    }

    /// Timeouts propagate; any other gateway failure is logged and dropped.
    async fn recommend(&self, spending: &SpendingRecord) -> Result<Option<RecommendationResult>> {
        match self.gateway.get_recommendations(spending).await {
            Ok(result) => Ok(Some(result)),
            Err(e @ AdvisorError::ExternalServiceTimeout { .. }) => Err(e),
            Err(e) => {
                error!(error = %e, "Recommendations unavailable for this turn");
                Ok(None)
            }
        }
    }
}
