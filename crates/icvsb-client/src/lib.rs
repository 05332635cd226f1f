//! `RequestClient`, the `BenchmarkKey` equivalence engine, the
//! `BenchmarkedRequestClient` state machine, and the BRC registry/scheduler
//! (spec §4.2-4.4).

pub mod benchmark_key;
pub mod brc;
pub mod error;
pub mod log_mirror;
pub mod registry;
pub mod request_client;
pub mod scheduler;

pub use benchmark_key::{valid_against, valid_against_response, BatchSnapshot, UriOutcome};
pub use brc::{BenchmarkedRequestClient, BrcConfig, BrcState, KeyCheckError, KeyedSendResult};
pub use error::{ClientError, ClientResult};
pub use log_mirror::LogMirror;
pub use registry::Registry;
pub use request_client::RequestClient;
