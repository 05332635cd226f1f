//! Azure AI Vision tagging adapter (spec §4.1, §6.1, §6.3).
//!
//! Authenticates via a subscription key (`AZURE_SUBSCRIPTION_KEY`, spec
//! §6.3) sent as the `Ocp-Apim-Subscription-Key` header, matching Azure's
//! actual Computer Vision API convention.

use async_trait::async_trait;
use icvsb_core::error::ProviderError;
use icvsb_core::labels::normalize_labels;
use std::time::Duration;

use crate::{download_and_check_mime, reqwest_to_provider_error, FetchOutcome, LabelProvider};

/// Success is indicated by a top-level `tagsResult.values` array.
pub struct AzureProvider {
    client: reqwest::Client,
    endpoint: String,
    subscription_key: String,
}

impl AzureProvider {
    pub fn new(endpoint: impl Into<String>, subscription_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
            endpoint: endpoint.into(),
            subscription_key: subscription_key.into(),
        }
    }
}

#[async_trait]
impl LabelProvider for AzureProvider {
    /// `min_confidence` is accepted for interface uniformity but ignored
    /// (spec §4.1: "Azure ignores minConfidence").
    async fn fetch(&self, uri: &str, max_labels: u32, _min_confidence: f64) -> FetchOutcome {
        let image = match download_and_check_mime(&self.client, uri).await {
            Ok(bytes) => bytes.0,
            Err(err) => return FetchOutcome::failure(&err),
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("features", "tags")])
            .body(image.to_vec())
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
                    class: "AzureVision".to_string(),
                    message: e.to_string(),
                };
                return FetchOutcome::failure(&err);
            }
        };

        let Some(tags) = payload
            .get("tagsResult")
            .and_then(|t| t.get("values"))
            .and_then(|v| v.as_array())
        else {
            let message = payload
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("missing tagsResult")
                .to_string();
            let err = ProviderError::ServiceError {
                class: "AzureVision".to_string(),
                message,
            };
            return FetchOutcome::failure(&err);
        };

        let raw = tags.iter().filter_map(|t| {
            let name = t.get("name")?.as_str()?.to_string();
            let confidence = t.get("confidence")?.as_f64()?;
            Some((name, confidence))
        });

        FetchOutcome::success(normalize_labels(raw, max_labels))
    }
}
