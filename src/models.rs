//! Core data models for the advisor

use crate::spending::{SpendingRecord, ValidationReport};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

//
// ================= Extraction =================
//

/// What an extractor read out of a single user message
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub reply: String,
    /// Only the categories mentioned in this message
    pub delta: SpendingRecord,
    pub follow_up: Option<String>,
    pub validation: ValidationReport,
}

/// Result of a full extraction step: the delta merged into the running
/// record plus the readiness decision. This is the cached value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    pub reply: String,
    pub delta: SpendingRecord,
    pub spending_data: SpendingRecord,
    pub follow_up_question: Option<String>,
    pub ready: bool,
    #[serde(skip)]
    pub validation: ValidationReport,
}

//
// ================= Recommendations =================
//

/// Envelope around the recommendation service's answer. Savings figures are
/// passed through exactly as received; a `null` figure stays `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub savings: Vec<CardRecommendation>,
}

impl RecommendationResult {
    /// Card names in the order the service ranked them
    pub fn card_names(&self) -> impl Iterator<Item = &str> {
        self.savings.iter().map(|c| c.card_name.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardRecommendation {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub card_name: String,
    #[serde(default)]
    pub seo_card_alias: Option<String>,
    /// Fee as the service formats it (e.g. "500")
    #[serde(default)]
    pub joining_fees: Option<Value>,
    #[serde(default)]
    pub total_savings: Option<f64>,
    #[serde(default)]
    pub total_savings_yearly: Option<f64>,
    #[serde(default)]
    pub total_extra_benefits: Option<f64>,
    #[serde(default)]
    pub max_potential_savings: Option<Value>,
    #[serde(default)]
    pub roi: Option<f64>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub card_bg_image: Option<String>,
    #[serde(default)]
    pub cg_network_url: Option<String>,
    #[serde(default, rename = "welcomeBenefits", deserialize_with = "null_as_default")]
    pub welcome_benefits: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_usps: Vec<Value>,
    /// Everything else the service sends, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

//
// ================= Chat Turn =================
//

/// Response body for one chat turn
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatTurnResponse {
    pub reply: String,
    pub spending_data: SpendingRecord,
    pub follow_up_question: Option<String>,
    pub ready: bool,
    pub recommendations: Option<RecommendationResult>,
}
