//! Google Cloud Vision label-detection adapter (spec §4.1, §6.1).

use async_trait::async_trait;
use icvsb_core::error::ProviderError;
use icvsb_core::labels::normalize_labels;
use std::time::Duration;

use crate::{download_and_check_mime, reqwest_to_provider_error, FetchOutcome, LabelProvider};

/// Success is indicated by a top-level `responses` array; anything else
/// (including a top-level `error` object) is a vendor failure.
pub struct GoogleProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LabelProvider for GoogleProvider {
    async fn fetch(&self, uri: &str, max_labels: u32, min_confidence: f64) -> FetchOutcome {
        let image = match download_and_check_mime(&self.client, uri).await {
            Ok(bytes) => bytes.0,
            Err(err) => return FetchOutcome::failure(&err),
        };

        let base64_image = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &image);
        let request_body = serde_json::json!({
            "requests": [{
                "image": { "content": base64_image },
                "features": [{ "type": "LABEL_DETECTION", "maxResults": max_labels }],
            }],
        });

        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&request_body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let err = reqwest_to_provider_error(e);
                return FetchOutcome::failure(&err);
            }
        };

        let payload: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                let err = ProviderError::ServiceError {
                    class: "GoogleVision".to_string(),
                    message: e.to_string(),
                };
                return FetchOutcome::failure(&err);
            }
        };

        let Some(annotations) = payload
            .get("responses")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .and_then(|r| r.get("labelAnnotations"))
            .and_then(|a| a.as_array())
        else {
            let message = payload
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("missing labelAnnotations")
                .to_string();
            let err = ProviderError::ServiceError {
                class: "GoogleVision".to_string(),
                message,
            };
            return FetchOutcome::failure(&err);
        };

        let raw = annotations.iter().filter_map(|a| {
            let label = a.get("description")?.as_str()?.to_string();
            let score = a.get("score")?.as_f64()?;
            (score >= min_confidence).then_some((label, score))
        });

        FetchOutcome::success(normalize_labels(raw, max_labels))
    }
}
