//! Shared application state (spec §6.2). One `AppState` per process,
//! cloned cheaply into every handler via `axum::extract::State`.

use icvsb_client::{LogMirror, Registry, RequestClient};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key for the in-memory 304 response cache (spec §11 supplemented
/// feature): the triple that uniquely identifies "this URI, benchmarked
/// against this key, through this BRC".
pub type ResponseCacheKey = (i64, i64, String);

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub client: Arc<RequestClient>,
    pub log_mirror: LogMirror,
    pub response_cache: Arc<Mutex<LruCache<ResponseCacheKey, serde_json::Value>>>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, client: Arc<RequestClient>, log_mirror: LogMirror, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            registry,
            client,
            log_mirror,
            response_cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }
}
