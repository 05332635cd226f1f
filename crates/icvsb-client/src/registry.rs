//! In-memory id -> BRC registry (spec §4.4, §6.2). Ids are monotonically
//! increasing and never reused, matching how `batch_requests`/`requests`
//! ids behave in the store.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::brc::BenchmarkedRequestClient;

pub struct Registry {
    next_id: AtomicI64,
    brcs: DashMap<i64, Arc<BenchmarkedRequestClient>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            brcs: DashMap::new(),
        }
    }

    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn insert(&self, brc: Arc<BenchmarkedRequestClient>) {
        self.brcs.insert(brc.id, brc);
    }

    pub fn get(&self, id: i64) -> Option<Arc<BenchmarkedRequestClient>> {
        self.brcs.get(&id).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<BenchmarkedRequestClient>> {
        self.brcs.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn remove(&self, id: i64) -> Option<Arc<BenchmarkedRequestClient>> {
        self.brcs.remove(&id).map(|(_, brc)| brc)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brc::BrcConfig;
    use crate::request_client::RequestClient;
    use icvsb_core::types::{Service, Severity};
    use icvsb_store::Store;
    use std::collections::HashMap;

    #[tokio::test]
    async fn registry_assigns_monotonic_ids() {
        let registry = Registry::new();
        let a = registry.next_id();
        let b = registry.next_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn registry_round_trips_insert_get_remove() {
        let store = Store::open("sqlite::memory:").await.unwrap();
        let client = Arc::new(RequestClient::new(store, HashMap::new()));
        let registry = Registry::new();
        let id = registry.next_id();
        let brc = Arc::new(BenchmarkedRequestClient::new(
            id,
            chrono::Utc::now(),
            BrcConfig {
                service: Service::Google,
                max_labels: 10,
                min_confidence: 0.5,
                delta_labels: 0,
                delta_confidence: 0.05,
                severity: Severity::Info,
                trigger_on_schedule: None,
                dataset: vec![],
                expected_labels: vec![],
                warning_callback_uri: None,
                benchmark_callback_uri: None,
                fail_count_threshold: 3,
            },
            client,
        ));
        registry.insert(brc.clone());
        assert!(registry.get(id).is_some());
        assert_eq!(registry.all().len(), 1);
        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
    }
}
