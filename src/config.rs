//! Environment-driven configuration
//!
//! Binaries call `dotenv::dotenv()` first, then [`AppConfig::from_env`].

use crate::error::AdvisorError;
use crate::Result;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_RECOMMENDATION_URL: &str = "https://bk-prod-external.bankkaro.com/cg/api/pro";

/// Knobs for the completion-backed extractor
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-0125-preview".to_string(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorMode {
    Llm,
    Heuristic,
}

impl FromStr for ExtractorMode {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llm" | "openai" | "completion" => Ok(ExtractorMode::Llm),
            "heuristic" | "rules" | "offline" => Ok(ExtractorMode::Heuristic),
            other => Err(AdvisorError::Config(format!(
                "EXTRACTOR_MODE must be 'llm' or 'heuristic', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub completion_api_key: Option<String>,
    pub completion_base_url: String,
    pub completion_timeout: Duration,
    pub extractor: ExtractorConfig,
    pub extractor_mode: ExtractorMode,
    pub recommendation_url: String,
    pub gateway_timeout: Duration,
    pub cache_ttl: Duration,
    pub history_window: usize,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion_api_key: None,
            completion_base_url: DEFAULT_COMPLETION_BASE_URL.to_string(),
            completion_timeout: Duration::from_secs(10),
            extractor: ExtractorConfig::default(),
            extractor_mode: ExtractorMode::Llm,
            recommendation_url: DEFAULT_RECOMMENDATION_URL.to_string(),
            gateway_timeout: Duration::from_secs(15),
            cache_ttl: Duration::from_secs(5 * 60),
            history_window: 12,
            port: 8080,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let completion_api_key = get("OPENAI_API_KEY")
            .filter(|k| k != "your_openai_api_key_here");

        let extractor = ExtractorConfig {
            model: get("OPENAI_MODEL").unwrap_or(defaults.extractor.model),
            max_tokens: parse_or(&get, "OPENAI_MAX_TOKENS", defaults.extractor.max_tokens)?,
            temperature: parse_or(&get, "OPENAI_TEMPERATURE", defaults.extractor.temperature)?,
        };

        let extractor_mode = match get("EXTRACTOR_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.extractor_mode,
        };

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| AdvisorError::Config(format!("PORT '{}' is invalid: {}", raw, e)))?,
            None => defaults.port,
        };

        let config = Self {
            completion_api_key,
            completion_base_url: get("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.completion_base_url),
            completion_timeout: Duration::from_secs(parse_or(
                &get,
                "COMPLETION_TIMEOUT_SECS",
                defaults.completion_timeout.as_secs(),
            )?),
            extractor,
            extractor_mode,
            recommendation_url: get("CARDGENIUS_API_URL").unwrap_or(defaults.recommendation_url),
            gateway_timeout: Duration::from_secs(parse_or(
                &get,
                "GATEWAY_TIMEOUT_SECS",
                defaults.gateway_timeout.as_secs(),
            )?),
            cache_ttl: Duration::from_secs(parse_or(
                &get,
                "CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            history_window: parse_or(&get, "HISTORY_WINDOW", defaults.history_window)?,
            port,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.extractor.temperature) {
            return Err(AdvisorError::Config(format!(
                "OPENAI_TEMPERATURE must be within [0, 2], got {}",
                self.extractor.temperature
            )));
        }
        if self.extractor.max_tokens == 0 {
            return Err(AdvisorError::Config(
                "OPENAI_MAX_TOKENS must be greater than zero".to_string(),
            ));
        }
        if self.completion_timeout.is_zero() || self.gateway_timeout.is_zero() {
            return Err(AdvisorError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.history_window == 0 {
            return Err(AdvisorError::Config(
                "HISTORY_WINDOW must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AdvisorError::Config(format!("{} '{}' is invalid: {}", key, raw, e))),
        None => Ok(default),
    }
}
