//! `BenchmarkedRequestClient` (BRC): a `RequestClient` paired with a
//! rolling benchmark key and a severity policy for what happens when a
//! live request drifts from it (spec §4.4).

use chrono::{DateTime, Utc};
use icvsb_core::error::InvalidKeyError;
use icvsb_core::labels::LabelMap;
use icvsb_core::types::{BenchmarkKey, Response, Service, Severity};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::benchmark_key::{valid_against, valid_against_response, BatchSnapshot, UriOutcome};
use crate::error::{ClientError, ClientResult};
use crate::request_client::RequestClient;
use icvsb_store::NewBenchmarkKey;

/// BRC lifecycle (spec §4.4): `New` until the first `benchmark()` call
/// completes, `Benchmarking` while one is in flight, `Ready` once a
/// current key exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrcState {
    New,
    Benchmarking,
    Ready,
}

/// Static configuration a BRC is created with (spec §4.4, §6.2 `POST /benchmark`).
#[derive(Debug, Clone)]
pub struct BrcConfig {
    pub service: Service,
    pub max_labels: u32,
    pub min_confidence: f64,
    pub delta_labels: u32,
    pub delta_confidence: f64,
    pub severity: Severity,
    pub trigger_on_schedule: Option<String>,
    /// The URI list the BRC was (re-)benchmarked against most recently;
    /// scheduled re-benchmarks resend this same dataset.
    pub dataset: Vec<String>,
    pub expected_labels: Vec<String>,
    pub warning_callback_uri: Option<String>,
    pub benchmark_callback_uri: Option<String>,
    /// Consecutive validation failures before a schedule-independent
    /// re-benchmark is triggered; 0 disables the trigger (spec §4.4).
    pub fail_count_threshold: u32,
}

/// The resource error from step 1 of `sendURIWithKey` (spec §4.4, §7):
/// distinct from the eight [`InvalidKeyError`] drift reasons since it means
/// there is no key at all to compare against yet.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyCheckError {
    #[error("no key yet")]
    NoKeyYet,
    #[error(transparent)]
    Mismatch(#[from] InvalidKeyError),
}

impl KeyCheckError {
    /// Stable, machine-readable reason code, matching
    /// [`InvalidKeyError::code`] for the `Mismatch` case (spec §4.4 step 1:
    /// `key_error: NO_KEY_YET`).
    pub fn code(&self) -> &'static str {
        match self {
            KeyCheckError::NoKeyYet => "NO_KEY_YET",
            KeyCheckError::Mismatch(e) => e.code(),
        }
    }
}

/// The `{labels?, response?, key_error?, response_error?}` Result shape of
/// spec §4.4's `sendURIWithKey`. Fields are independently optional because
/// severity shaping (step 5) strips `labels`/`response` without touching
/// the error fields.
#[derive(Debug, Clone, Default)]
pub struct KeyedSendResult {
    pub labels: Option<LabelMap>,
    pub response: Option<Response>,
    pub key_error: Option<KeyCheckError>,
    pub response_error: Option<InvalidKeyError>,
}

impl KeyedSendResult {
    pub fn has_error(&self) -> bool {
        self.key_error.is_some() || self.response_error.is_some()
    }
}

pub struct BenchmarkedRequestClient {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    config: BrcConfig,
    client: Arc<RequestClient>,
    state: Mutex<BrcState>,
    current_key: Mutex<Option<BenchmarkKey>>,
    /// Every key ever minted for this BRC, oldest first, including expired
    /// ones (spec §3: "keys are only expired, never deleted"). Backs the
    /// `If-Unmodified-Since` key lookup (spec §6.2) since the store itself
    /// only indexes keys by service, not by owning BRC.
    key_history: Mutex<Vec<BenchmarkKey>>,
    /// Consecutive validation failures since the last successful check or
    /// triggered re-benchmark (spec §4.4 step 4).
    fail_count: AtomicU32,
    /// Lifetime count of validation failures, exposed via `GET
    /// /benchmark/:id` as `invalid_state_count` (spec §6.2).
    invalid_state_count: AtomicU32,
    benchmark_count: AtomicU32,
    last_benchmark_time: Mutex<Option<DateTime<Utc>>>,
}

impl BenchmarkedRequestClient {
    pub fn new(id: i64, created_at: DateTime<Utc>, config: BrcConfig, client: Arc<RequestClient>) -> Self {
        Self {
            id,
            created_at,
            config,
            client,
            state: Mutex::new(BrcState::New),
            current_key: Mutex::new(None),
            key_history: Mutex::new(Vec::new()),
            fail_count: AtomicU32::new(0),
            invalid_state_count: AtomicU32::new(0),
            benchmark_count: AtomicU32::new(0),
            last_benchmark_time: Mutex::new(None),
        }
    }

    pub fn state(&self) -> BrcState {
        *self.state.lock()
    }

    pub fn benchmarking(&self) -> bool {
        self.state() == BrcState::Benchmarking
    }

    pub fn current_key(&self) -> Option<BenchmarkKey> {
        self.current_key.lock().clone()
    }

    pub fn config(&self) -> &BrcConfig {
        &self.config
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count.load(Ordering::SeqCst)
    }

    pub fn invalid_state_count(&self) -> u32 {
        self.invalid_state_count.load(Ordering::SeqCst)
    }

    pub fn benchmark_count(&self) -> u32 {
        self.benchmark_count.load(Ordering::SeqCst)
    }

    pub fn last_benchmark_time(&self) -> Option<DateTime<Utc>> {
        *self.last_benchmark_time.lock()
    }

    /// Look up a previously minted key by id, for `GET /key/:id` and for
    /// ETags that carry an explicit key id (spec §6.2).
    pub fn key_by_id(&self, key_id: i64) -> Option<BenchmarkKey> {
        self.key_history.lock().iter().find(|k| k.id == key_id).cloned()
    }

    /// Most recent key created at or before `cutoff` (spec §6.2
    /// `If-Unmodified-Since` selection). `None` if no key this old exists.
    pub fn key_as_of(&self, cutoff: DateTime<Utc>) -> Option<BenchmarkKey> {
        self.key_history
            .lock()
            .iter()
            .filter(|k| k.created_at <= cutoff)
            .max_by_key(|k| k.created_at)
            .cloned()
    }

    /// Runs a fresh batch against `uris` and compares it with the existing
    /// key, if any (spec §4.4).
    ///
    /// A key is only ever expired when the new batch is found *inequivalent*
    /// to it (spec §3): only then does the new batch become the current key
    /// and the old one get expired. An equivalent re-benchmark — the common
    /// case for a stable service, and the §8 "exact reproduction" scenario —
    /// leaves `current_key` untouched; the new row is still inserted and
    /// kept in history (open question, spec §9; see DESIGN.md) so a
    /// sequence of equivalent re-benchmarks has real history to walk, but it
    /// never becomes current and never expires the key it was compared
    /// against.
    pub async fn benchmark(&self, uris: &[String]) -> ClientResult<BenchmarkKey> {
        if uris.is_empty() {
            return Err(ClientError::EmptyDataset);
        }
        *self.state.lock() = BrcState::Benchmarking;

        let batch = match self.client.store().create_batch_request().await {
            Ok(b) => b,
            Err(e) => {
                self.reset_state_after_failure();
                return Err(e.into());
            }
        };

        let results = self
            .client
            .send_uris_async(
                self.config.service,
                batch.id,
                uris,
                self.config.max_labels,
                self.config.min_confidence,
            )
            .await;

        let results = match results {
            Ok(r) => r,
            Err(e) => {
                self.reset_state_after_failure();
                return Err(e);
            }
        };

        let snapshot = self.snapshot_from_results(&results);

        // Spec §3: a key is only expired "when a newer key is found
        // inequivalent to the current key under the key's own tolerances".
        // An equivalent re-benchmark (the common case for a stable service)
        // must leave `current_key` untouched.
        let previous = self.current_key();
        let drifted = match &previous {
            Some(previous) => match self.snapshot_for_key(previous).await {
                Ok(previous_snapshot) => match valid_against(&snapshot, &previous_snapshot) {
                    Ok(()) => {
                        info!(brc_id = self.id, "re-benchmark reproduced the current key");
                        false
                    }
                    Err(reason) => {
                        warn!(brc_id = self.id, %reason, "re-benchmark drifted from current key");
                        true
                    }
                },
                Err(e) => {
                    warn!(brc_id = self.id, %e, "could not reconstruct previous key's snapshot");
                    true
                }
            },
            None => true,
        };

        let new_key = match self
            .client
            .store()
            .create_benchmark_key(NewBenchmarkKey {
                service: self.config.service,
                batch_request_id: batch.id,
                severity: self.config.severity,
                delta_labels: self.config.delta_labels,
                delta_confidence: self.config.delta_confidence,
                max_labels: self.config.max_labels,
                min_confidence: self.config.min_confidence,
                expected_labels: self.config.expected_labels.clone(),
            })
            .await
        {
            Ok(k) => k,
            Err(e) => {
                self.reset_state_after_failure();
                return Err(e.into());
            }
        };

        for (_, response) in &results {
            self.client
                .store()
                .set_response_benchmark_key(response.id, new_key.id)
                .await?;
        }
        self.key_history.lock().push(new_key.clone());

        if drifted {
            if let Some(previous) = &previous {
                if let Err(e) = self.client.store().expire_benchmark_key(previous.id).await {
                    self.reset_state_after_failure();
                    return Err(e.into());
                }
            }
            *self.current_key.lock() = Some(new_key.clone());
        }

        *self.state.lock() = BrcState::Ready;
        self.fail_count.store(0, Ordering::SeqCst);
        self.benchmark_count.fetch_add(1, Ordering::SeqCst);
        *self.last_benchmark_time.lock() = Some(new_key.created_at);

        if let Some(callback) = &self.config.benchmark_callback_uri {
            self.fire_benchmark_callback(callback, &new_key).await;
        }

        Ok(new_key)
    }

    /// Reverts state to `New` after a failed benchmark attempt so a caller
    /// can retry; distinct from `Ready` since no key was ever produced
    /// unless this is a re-benchmark (current_key survives untouched).
    fn reset_state_after_failure(&self) {
        let state = if self.current_key().is_some() {
            BrcState::Ready
        } else {
            BrcState::New
        };
        *self.state.lock() = state;
    }

    fn snapshot_from_results(&self, results: &[(icvsb_core::types::Request, Response)]) -> BatchSnapshot {
        let outcomes: Vec<UriOutcome> = results
            .iter()
            .map(|(req, resp)| UriOutcome {
                uri: req.uri.clone(),
                success: resp.success,
                labels: resp.labels(),
            })
            .collect();

        BatchSnapshot {
            service: self.config.service,
            max_labels: self.config.max_labels,
            min_confidence: self.config.min_confidence,
            delta_labels: self.config.delta_labels,
            delta_confidence: self.config.delta_confidence,
            outcomes,
        }
    }

    async fn snapshot_for_key(&self, key: &BenchmarkKey) -> ClientResult<BatchSnapshot> {
        let responses = self
            .client
            .store()
            .responses_for_batch(key.batch_request_id)
            .await?;
        let requests = self
            .client
            .store()
            .requests_for_batch(key.batch_request_id)
            .await?;

        let uri_by_request: std::collections::HashMap<i64, String> =
            requests.into_iter().map(|r| (r.id, r.uri)).collect();

        let outcomes = responses
            .into_iter()
            .filter_map(|resp| {
                let uri = uri_by_request.get(&resp.request_id)?.clone();
                Some(UriOutcome {
                    uri,
                    success: resp.success,
                    labels: resp.labels(),
                })
            })
            .collect();

        Ok(BatchSnapshot {
            service: key.service,
            max_labels: key.max_labels,
            min_confidence: key.min_confidence,
            delta_labels: key.delta_labels,
            delta_confidence: key.delta_confidence,
            outcomes,
        })
    }

    /// The hot path (spec §4.4): sends `uri` through the live provider but
    /// only after confirming `supplied_key` (the caller's reference point,
    /// typically decoded from an `If-Match` ETag) still agrees with the
    /// BRC's `current_key`. Never returns `Err` for drift — drift is
    /// reported through the Result's `key_error`/`response_error` fields,
    /// exactly as spec'd, so the HTTP layer can shape status codes itself.
    pub async fn send_uri_with_key(
        self: &Arc<Self>,
        uri: &str,
        supplied_key: &BenchmarkKey,
    ) -> ClientResult<KeyedSendResult> {
        let Some(current) = self.current_key() else {
            return Ok(KeyedSendResult {
                key_error: Some(KeyCheckError::NoKeyYet),
                ..Default::default()
            });
        };

        let current_snapshot = self.snapshot_for_key(&current).await?;
        let supplied_snapshot = self.snapshot_for_key(supplied_key).await?;

        if let Err(reason) = valid_against(&current_snapshot, &supplied_snapshot) {
            self.record_failure();
            self.maybe_trigger_rebenchmark();
            return Ok(KeyedSendResult {
                key_error: Some(KeyCheckError::Mismatch(reason)),
                ..Default::default()
            });
        }

        let (_, response) = self
            .client
            .send_uri(
                self.config.service,
                None,
                uri,
                self.config.max_labels,
                self.config.min_confidence,
            )
            .await?;
        self.client
            .store()
            .set_response_benchmark_key(response.id, current.id)
            .await?;

        let labels = response.labels();
        let response_error = valid_against_response(&current, &labels).err();
        if response_error.is_some() {
            self.record_failure();
            self.maybe_trigger_rebenchmark();
        } else {
            self.fail_count.store(0, Ordering::SeqCst);
        }

        let mut result = KeyedSendResult {
            labels: Some(labels),
            response: Some(response),
            key_error: None,
            response_error,
        };

        self.shape_by_severity(&mut result, &current.severity).await;
        Ok(result)
    }

    fn record_failure(&self) {
        self.fail_count.fetch_add(1, Ordering::SeqCst);
        self.invalid_state_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Trigger law (spec §8): strictly more than `fail_count_threshold`
    /// consecutive failures starts exactly one re-benchmark and resets the
    /// counter. Runs detached so the request path never blocks on a
    /// dataset-sized fan-out (spec §4.4 step 4).
    fn maybe_trigger_rebenchmark(self: &Arc<Self>) {
        let threshold = self.config.fail_count_threshold;
        if threshold == 0 || self.fail_count.load(Ordering::SeqCst) <= threshold {
            return;
        }
        self.fail_count.store(0, Ordering::SeqCst);
        info!(brc_id = self.id, threshold, "fail-count threshold exceeded, triggering re-benchmark");
        let brc = Arc::clone(self);
        let dataset = self.config.dataset.clone();
        tokio::spawn(async move {
            if let Err(err) = brc.benchmark(&dataset).await {
                tracing::error!(brc_id = brc.id, %err, "fail-count-triggered re-benchmark failed");
            }
        });
    }

    /// Shapes the result per `current_key.severity` (spec §4.4 step 5).
    /// Only called when a labeled response was produced; `NoKeyYet` never
    /// reaches here since it returns before the provider call.
    async fn shape_by_severity(&self, result: &mut KeyedSendResult, severity: &Severity) {
        if !result.has_error() {
            return;
        }
        match severity {
            Severity::Exception => {
                result.labels = None;
                result.response = None;
            }
            Severity::Warning => {
                if let Some(callback) = &self.config.warning_callback_uri {
                    self.fire_warning_callback(callback, result).await;
                }
            }
            Severity::Info => {
                if let Some(err) = &result.key_error {
                    warn!(brc_id = self.id, %err, "key validity check failed");
                }
                if let Some(err) = &result.response_error {
                    warn!(brc_id = self.id, %err, "response validity check failed");
                }
            }
            Severity::None => {}
        }
    }

    async fn fire_warning_callback(&self, callback_uri: &str, result: &KeyedSendResult) {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "brc_id": self.id,
            "key_error": result.key_error.as_ref().map(|e| e.to_string()),
            "response_error": result.response_error.as_ref().map(|e| e.to_string()),
        });
        if let Err(err) = client.post(callback_uri).json(&body).send().await {
            warn!(brc_id = self.id, %err, "warning_callback_uri delivery failed");
        }
    }

    async fn fire_benchmark_callback(&self, callback_uri: &str, key: &BenchmarkKey) {
        let client = reqwest::Client::new();
        let body = serde_json::json!({ "brc_id": self.id, "key_id": key.id });
        if let Err(err) = client.post(callback_uri).json(&body).send().await {
            warn!(brc_id = self.id, %err, "benchmark_callback_uri delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icvsb_provider::scripted::ScriptedProvider;
    use icvsb_store::Store;
    use std::collections::HashMap;

    async fn make_brc(config: BrcConfig, provider: Arc<ScriptedProvider>) -> Arc<BenchmarkedRequestClient> {
        let store = Store::open("sqlite::memory:").await.unwrap();
        let mut providers: HashMap<Service, Arc<dyn icvsb_provider::LabelProvider>> = HashMap::new();
        providers.insert(config.service, provider);
        let client = Arc::new(RequestClient::new(store, providers));
        Arc::new(BenchmarkedRequestClient::new(1, Utc::now(), config, client))
    }

    fn base_config(service: Service, dataset: Vec<String>) -> BrcConfig {
        BrcConfig {
            service,
            max_labels: 10,
            min_confidence: 0.0,
            delta_labels: 0,
            delta_confidence: 0.01,
            severity: Severity::Info,
            trigger_on_schedule: None,
            dataset,
            expected_labels: vec![],
            warning_callback_uri: None,
            benchmark_callback_uri: None,
            fail_count_threshold: 0,
        }
    }

    #[tokio::test]
    async fn no_key_yet_before_first_benchmark() {
        let provider = Arc::new(ScriptedProvider::new());
        let dataset = vec!["https://x/a.jpg".to_string()];
        let brc = make_brc(base_config(Service::Google, dataset.clone()), provider).await;

        assert_eq!(brc.state(), BrcState::New);
        assert!(brc.current_key().is_none());

        // sendURIWithKey needs *some* key to compare against; simulate a
        // caller holding a stale key from elsewhere by constructing one
        // directly is unnecessary here since NoKeyYet short-circuits
        // before any comparison.
        let fake_key = BenchmarkKey {
            id: 999,
            service: Service::Google,
            batch_request_id: 1,
            severity: Severity::Info,
            created_at: Utc::now(),
            expired: false,
            delta_labels: 0,
            delta_confidence: 0.0,
            max_labels: 10,
            min_confidence: 0.0,
            expected_labels: vec![],
        };
        let result = brc.send_uri_with_key("https://x/a.jpg", &fake_key).await.unwrap();
        assert!(matches!(result.key_error, Some(KeyCheckError::NoKeyYet)));
        assert!(result.labels.is_none());
    }

    #[tokio::test]
    async fn first_benchmark_then_matching_key_serves_labels() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.set("https://x/cat.jpg", ScriptedProvider::labels([("cat", 0.9)]));
        let dataset = vec!["https://x/cat.jpg".to_string()];
        let brc = make_brc(base_config(Service::Google, dataset.clone()), provider).await;

        let key = brc.benchmark(&dataset).await.unwrap();
        assert_eq!(brc.state(), BrcState::Ready);
        assert_eq!(brc.benchmark_count(), 1);

        let result = brc.send_uri_with_key("https://x/cat.jpg", &key).await.unwrap();
        assert!(!result.has_error());
        assert_eq!(result.labels.unwrap().get("cat"), Some(&0.9));
    }

    #[tokio::test]
    async fn exception_severity_hides_labels_on_drift() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.set("https://x/cat.jpg", ScriptedProvider::labels([("cat", 0.9)]));
        let dataset = vec!["https://x/cat.jpg".to_string()];
        let mut config = base_config(Service::Google, dataset.clone());
        config.severity = Severity::Exception;
        config.expected_labels = vec!["dog".to_string()];
        let brc = make_brc(config, provider).await;

        let key = brc.benchmark(&dataset).await.unwrap();
        let result = brc.send_uri_with_key("https://x/cat.jpg", &key).await.unwrap();

        assert!(result.labels.is_none());
        assert!(result.response.is_none());
        assert!(result.response_error.is_some());
    }

    /// Spec §3 / §8 "exact reproduction": a re-benchmark whose batch is
    /// equivalent to the current key must not expire it or replace it, even
    /// though a new key row is still minted and kept in history.
    #[tokio::test]
    async fn equivalent_rebenchmark_keeps_current_key() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.set("https://x/cat.jpg", ScriptedProvider::labels([("cat", 0.9)]));
        let dataset = vec!["https://x/cat.jpg".to_string()];
        let brc = make_brc(base_config(Service::Google, dataset.clone()), provider).await;

        let k1 = brc.benchmark(&dataset).await.unwrap();
        let k2 = brc.benchmark(&dataset).await.unwrap();

        assert_ne!(k1.id, k2.id);
        let current = brc.current_key().unwrap();
        assert_eq!(current.id, k1.id);
        assert!(!current.expired);

        let stored_k1 = brc
            .client
            .store()
            .get_benchmark_key(k1.id)
            .await
            .unwrap();
        assert!(!stored_k1.expired);
        assert_eq!(brc.key_by_id(k2.id).map(|k| k.id), Some(k2.id));
    }

    #[tokio::test]
    async fn key_as_of_selects_most_recent_not_after_cutoff() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.set("https://x/a.jpg", ScriptedProvider::labels([("a", 0.9)]));
        let dataset = vec!["https://x/a.jpg".to_string()];
        let brc = make_brc(base_config(Service::Google, dataset.clone()), provider).await;

        let k1 = brc.benchmark(&dataset).await.unwrap();
        let k2 = brc.benchmark(&dataset).await.unwrap();

        let selected = brc.key_as_of(k1.created_at).unwrap();
        assert_eq!(selected.id, k1.id);
        let selected_latest = brc.key_as_of(k2.created_at).unwrap();
        assert_eq!(selected_latest.id, k2.id);
    }
}
