//! Amazon Rekognition label-detection adapter (spec §4.1, §6.1).

use async_trait::async_trait;
use icvsb_core::error::ProviderError;
use icvsb_core::labels::normalize_labels;
use std::time::Duration;

use crate::{download_and_check_mime, reqwest_to_provider_error, FetchOutcome, LabelProvider};

/// Success is indicated by a top-level `Labels` array. Rekognition reports
/// confidence on a 0-100 scale; this adapter normalizes it into `[0, 1]`
/// before the shared [`normalize_labels`] clamp runs.
pub struct AmazonProvider {
    client: reqwest::Client,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl AmazonProvider {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl LabelProvider for AmazonProvider {
    async fn fetch(&self, uri: &str, max_labels: u32, min_confidence: f64) -> FetchOutcome {
        let image = match download_and_check_mime(&self.client, uri).await {
            Ok(bytes) => bytes.0,
            Err(err) => return FetchOutcome::failure(&err),
        };

        let request_body = serde_json::json!({
            "Image": { "Bytes": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &image) },
            "MaxLabels": max_labels,
            "MinConfidence": min_confidence * 100.0,
        });

        let response = match self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.access_key, Some(&self.secret_key))
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
                    class: "AmazonRekognition".to_string(),
                    message: e.to_string(),
                };
                return FetchOutcome::failure(&err);
            }
        };

        let Some(labels) = payload.get("Labels").and_then(|l| l.as_array()) else {
            let message = payload
                .get("Message")
                .and_then(|m| m.as_str())
                .unwrap_or("missing Labels")
                .to_string();
            let err = ProviderError::ServiceError {
                class: "AmazonRekognition".to_string(),
                message,
            };
            return FetchOutcome::failure(&err);
        };

        let raw = labels.iter().filter_map(|l| {
            let name = l.get("Name")?.as_str()?.to_string();
            let confidence_pct = l.get("Confidence")?.as_f64()?;
            let confidence = confidence_pct / 100.0;
            (confidence >= min_confidence).then_some((name, confidence))
        });

        FetchOutcome::success(normalize_labels(raw, max_labels))
    }
}
