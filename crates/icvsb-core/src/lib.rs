//! Shared data model, validators, and error types for the icvsb engine.
//!
//! This crate has no I/O of its own: it is the vocabulary the other crates
//! (`icvsb-provider`, `icvsb-store`, `icvsb-client`, `icvsb-server`) share.

pub mod error;
pub mod labels;
pub mod types;
pub mod validators;

pub use error::{InvalidKeyError, ProviderError, ValidationError};
pub use labels::{normalize_labels, symmetric_diff, LabelMap};
pub use types::{Service, Severity};
