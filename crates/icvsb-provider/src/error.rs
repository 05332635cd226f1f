//! This crate doesn't mint its own error type: every adapter failure mode
//! is already covered by [`icvsb_core::error::ProviderError`].

pub type FetchError = icvsb_core::error::ProviderError;
