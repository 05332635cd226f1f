//! `RequestClient`: the unbenchmarked, provider-facing send path (spec §4.2).
//!
//! Persists every request/response pair through the store regardless of
//! success, so a `RequestClient` caller is always working against durable
//! history rather than best-effort in-memory state.

use futures::stream::{self, StreamExt};
use icvsb_core::types::{Request, Response, Service};
use icvsb_provider::LabelProvider;
use icvsb_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::error::{ClientError, ClientResult};

/// Default fan-out width for `send_uris_async` (spec §4.2: "a bounded
/// number of requests in flight at once").
const DEFAULT_CONCURRENCY: usize = 8;

pub struct RequestClient {
    store: Store,
    providers: HashMap<Service, Arc<dyn LabelProvider>>,
    concurrency: usize,
}

impl RequestClient {
    pub fn new(store: Store, providers: HashMap<Service, Arc<dyn LabelProvider>>) -> Self {
        Self {
            store,
            providers,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn provider_for(&self, service: Service) -> ClientResult<Arc<dyn LabelProvider>> {
        self.providers
            .get(&service)
            .cloned()
            .ok_or_else(|| ClientError::UnsupportedService(service.to_string()))
    }

    /// Sends a single URI through `service`'s provider, persisting the
    /// request and its response (spec §4.2).
    #[instrument(skip(self), fields(service = %service, uri))]
    pub async fn send_uri(
        &self,
        service: Service,
        batch_request_id: Option<i64>,
        uri: &str,
        max_labels: u32,
        min_confidence: f64,
    ) -> ClientResult<(Request, Response)> {
        let provider = self.provider_for(service)?;
        let request = self
            .store
            .create_request(service, batch_request_id, uri)
            .await?;

        let outcome = provider.fetch(uri, max_labels, min_confidence).await;
        if !outcome.success {
            warn!(uri, "label provider reported failure");
        }

        let body = serde_json::to_vec(&outcome.body).ok();
        let response = self
            .store
            .create_response(request.id, body.as_deref(), outcome.success)
            .await?;

        Ok((request, response))
    }

    /// Sequential batch send — every URI is attempted even if an earlier
    /// one fails (spec §4.2: a batch's success is evaluated as a whole by
    /// the caller, not short-circuited here).
    pub async fn send_uris(
        &self,
        service: Service,
        batch_request_id: i64,
        uris: &[String],
        max_labels: u32,
        min_confidence: f64,
    ) -> ClientResult<Vec<(Request, Response)>> {
        if uris.is_empty() {
            return Err(ClientError::EmptyDataset);
        }
        let mut results = Vec::with_capacity(uris.len());
        for uri in uris {
            results.push(
                self.send_uri(service, Some(batch_request_id), uri, max_labels, min_confidence)
                    .await?,
            );
        }
        Ok(results)
    }

    /// Same as [`Self::send_uris`] but fans requests out with bounded
    /// parallelism (spec §4.2). Order of the returned vector matches the
    /// input order, not completion order.
    pub async fn send_uris_async(
        &self,
        service: Service,
        batch_request_id: i64,
        uris: &[String],
        max_labels: u32,
        min_confidence: f64,
    ) -> ClientResult<Vec<(Request, Response)>> {
        if uris.is_empty() {
            return Err(ClientError::EmptyDataset);
        }
        if !self.store.supports_concurrent_writers() {
            return Err(ClientError::UnsupportedBackend);
        }

        let results = stream::iter(uris.iter().cloned())
            .map(|uri| async move {
                self.send_uri(service, Some(batch_request_id), &uri, max_labels, min_confidence)
                    .await
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        results.into_iter().collect()
    }
}
