//! Client-crate error type (spec §7). Wraps the lower layers' errors rather
//! than re-deriving them.

use icvsb_core::error::InvalidKeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] icvsb_store::StoreError),
    #[error("no label provider registered for service {0}")]
    UnsupportedService(String),
    #[error("benchmarked request client {0} not found")]
    UnknownBrc(i64),
    #[error("benchmarked request client {0} has no current key yet (still benchmarking)")]
    NotReady(i64),
    #[error("key mismatch: {0}")]
    InvalidKey(#[from] InvalidKeyError),
    #[error("empty dataset: a benchmark batch needs at least one URI")]
    EmptyDataset,
    #[error("store backend does not support concurrent writers; use the serial send path")]
    UnsupportedBackend,
}

pub type ClientResult<T> = Result<T, ClientError>;
