//! A deterministic, network-free [`LabelProvider`] for tests and local
//! development without vendor credentials.
//!
//! Scripted responses are keyed by URI so a test can assert exact
//! reproduction (spec §8 "identical URIs, identical labels") or construct a
//! deliberately drifted second run.

use async_trait::async_trait;
use icvsb_core::error::ProviderError;
use icvsb_core::labels::{normalize_labels, LabelMap};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::{FetchOutcome, LabelProvider};

#[derive(Debug, Clone)]
pub enum Script {
    Labels(Vec<(String, f64)>),
    Failure { class: String, message: String },
}

/// Swap in canned responses per URI; unknown URIs fail with `ServiceError`.
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, uri: impl Into<String>, script: Script) {
        self.scripts.lock().insert(uri.into(), script);
    }

    pub fn labels(labels: impl IntoIterator<Item = (&'static str, f64)>) -> Script {
        Script::Labels(labels.into_iter().map(|(l, c)| (l.to_string(), c)).collect())
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LabelProvider for ScriptedProvider {
    async fn fetch(&self, uri: &str, max_labels: u32, min_confidence: f64) -> FetchOutcome {
        let script = self.scripts.lock().get(uri).cloned();
        match script {
            Some(Script::Labels(raw)) => {
                let filtered = raw.into_iter().filter(|(_, c)| *c >= min_confidence);
                let labels: LabelMap = normalize_labels(filtered, max_labels);
                FetchOutcome::success(labels)
            }
            Some(Script::Failure { class, message }) => {
                let err = ProviderError::ServiceError { class, message };
                FetchOutcome::failure(&err)
            }
            None => {
                let err = ProviderError::ServiceError {
                    class: "ScriptedProvider".to_string(),
                    message: format!("no script registered for {uri}"),
                };
                FetchOutcome::failure(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_provider_reproduces_identical_labels() {
        let provider = ScriptedProvider::new();
        provider.set(
            "https://example.com/cat.jpg",
            ScriptedProvider::labels([("cat", 0.95), ("animal", 0.8)]),
        );

        let first = provider.fetch("https://example.com/cat.jpg", 10, 0.5).await;
        let second = provider.fetch("https://example.com/cat.jpg", 10, 0.5).await;

        assert!(first.success);
        assert_eq!(first.labels, second.labels);
    }

    #[tokio::test]
    async fn scripted_provider_filters_below_min_confidence() {
        let provider = ScriptedProvider::new();
        provider.set(
            "https://example.com/dog.jpg",
            ScriptedProvider::labels([("dog", 0.9), ("noise", 0.1)]),
        );

        let outcome = provider.fetch("https://example.com/dog.jpg", 10, 0.5).await;
        assert_eq!(outcome.labels.len(), 1);
        assert!(outcome.labels.contains_key("dog"));
    }

    #[tokio::test]
    async fn unregistered_uri_fails() {
        let provider = ScriptedProvider::new();
        let outcome = provider.fetch("https://example.com/unknown.jpg", 10, 0.5).await;
        assert!(!outcome.success);
    }
}
