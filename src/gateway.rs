//! Recommendation Gateway
//!
//! Forwards a finalized spending record to the external card recommendation
//! service. The payload always carries every known key (unset → 0) plus a
//! null `selected_card_id`.

use crate::error::AdvisorError;
use crate::models::RecommendationResult;
use crate::spending::SpendingRecord;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

const SERVICE_NAME: &str = "recommendation service";

/// Trait for the external recommendation service
#[async_trait]
pub trait RecommendationService: Send + Sync {
    /// Upstream JSON exactly as received
    async fn fetch_raw(&self, spending: &SpendingRecord) -> Result<Value>;

    /// Upstream JSON wrapped in the typed envelope
    async fn get_recommendations(&self, spending: &SpendingRecord) -> Result<RecommendationResult> {
        let raw = self.fetch_raw(spending).await?;
        serde_json::from_value(raw).map_err(|e| {
            error!("Recommendation payload did not match the expected shape: {}", e);
            AdvisorError::Gateway {
                status: 502,
                body: format!("unexpected payload shape: {}", e),
            }
        })
    }
}

/// Build the outbound request body
pub fn request_body(spending: &SpendingRecord) -> Value {
    let mut body = spending.zero_filled();
    body.insert("selected_card_id".to_string(), Value::Null);
    Value::Object(body)
}

#[derive(Clone)]
pub struct CardGeniusGateway {
    client: Client,
    url: String,
    timeout: Duration,
}

impl CardGeniusGateway {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AdvisorError {
        if e.is_timeout() {
            error!("Recommendation request timed out: {}", e);
            AdvisorError::ExternalServiceTimeout {
                service: SERVICE_NAME,
                seconds: self.timeout.as_secs(),
            }
        } else {
            error!("Recommendation request failed: {}", e);
            AdvisorError::HttpError(e)
        }
    }
}

#[async_trait]
impl RecommendationService for CardGeniusGateway {
    async fn fetch_raw(&self, spending: &SpendingRecord) -> Result<Value> {
        let body = request_body(spending);
        info!(
            categories = spending.len(),
            "Requesting card recommendations"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            error!(status = status.as_u16(), "Recommendation service error: {}", text);
            return Err(AdvisorError::Gateway {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("Recommendation service returned invalid JSON: {}", e);
            AdvisorError::Gateway {
                status: 502,
                body: format!("invalid JSON from upstream: {}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spending::SpendingCategory;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer, timeout: Duration) -> CardGeniusGateway {
        CardGeniusGateway::new(format!("{}/cg/api/pro", server.uri()), timeout).unwrap()
    }

    #[test]
    fn test_request_body_is_zero_filled() {
        let spending = SpendingRecord::new().with(SpendingCategory::Rent, 20000.0);
        let body = request_body(&spending);

        assert_eq!(body["rent"], json!(20000));
        assert_eq!(body["amazon_spends"], json!(0));
        assert_eq!(body["selected_card_id"], Value::Null);
        assert_eq!(body.as_object().unwrap().len(), SpendingCategory::ALL.len() + 1);
    }

    #[tokio::test]
    async fn test_success_is_wrapped() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/cg/api/pro"))
            .and(body_partial_json(json!({ "fuel": 15000, "rent": 0, "selected_card_id": null })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Savings calculated",
                "savings": [
                    { "id": 1, "card_name": "SBI Cashback", "total_savings_yearly": 9000 },
                    { "id": 2, "card_name": "IndianOil RBL", "total_savings_yearly": 7200 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spending = SpendingRecord::new().with(SpendingCategory::Fuel, 15000.0);
        let result = gateway(&server, Duration::from_secs(5))
            .get_recommendations(&spending)
            .await;

        let result = tokio_test::assert_ok!(result);
        assert!(result.success);
        assert_eq!(
            result.card_names().collect::<Vec<_>>(),
            vec!["SBI Cashback", "IndianOil RBL"]
        );
        assert_eq!(result.savings[0].total_savings_yearly, Some(9000.0));
    }

    #[tokio::test]
    async fn test_raw_passthrough_is_untouched() {
        let server = MockServer::start().await;
        let upstream = json!({ "success": true, "savings": [], "debug": { "took_ms": 12 } });

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(upstream.clone()))
            .mount(&server)
            .await;

        let raw = gateway(&server, Duration::from_secs(5))
            .fetch_raw(&SpendingRecord::new())
            .await
            .unwrap();
        assert_eq!(raw, upstream);
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
            .mount(&server)
            .await;

        let err = gateway(&server, Duration::from_secs(5))
            .get_recommendations(&SpendingRecord::new())
            .await;

        match tokio_test::assert_err!(err) {
            AdvisorError::Gateway { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "database down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_success_is_gateway_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = gateway(&server, Duration::from_secs(5))
            .fetch_raw(&SpendingRecord::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::Gateway { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "savings": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = gateway(&server, Duration::from_millis(200))
            .fetch_raw(&SpendingRecord::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::ExternalServiceTimeout { .. }));
    }
}
