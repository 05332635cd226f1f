//! The `LabelProvider` contract (spec §4.1, §6.1) — the only seam to vendor
//! code. Concrete vendor adapters are external collaborators: this crate
//! gives each of them a thin, uniform shape (download, MIME-check, call,
//! normalize) rather than a full vendor SDK.

pub mod amazon;
pub mod azure;
pub mod error;
pub mod google;
pub mod scripted;

use async_trait::async_trait;
use icvsb_core::labels::LabelMap;

pub use error::FetchError;

/// Outcome of a single `fetch` call, already normalized to the shape
/// `RequestClient` persists into a `Response` row (spec §4.1).
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Raw JSON body to persist: `{"labels": {...}}` on success,
    /// `{"service_error": "..."}` on failure.
    pub body: serde_json::Value,
    pub success: bool,
    pub labels: LabelMap,
}

impl FetchOutcome {
    pub fn success(labels: LabelMap) -> Self {
        let body = serde_json::json!({ "labels": &labels });
        Self {
            body,
            success: true,
            labels,
        }
    }

    pub fn failure(err: &icvsb_core::error::ProviderError) -> Self {
        Self {
            body: err.as_service_error_json(),
            success: false,
            labels: LabelMap::new(),
        }
    }
}

/// `fetch(uri, maxLabels, minConfidence) -> {body, success, labels}` (spec §4.1).
///
/// Implementations must never panic or propagate errors across this
/// boundary: every failure mode becomes a `FetchOutcome::failure`.
#[async_trait]
pub trait LabelProvider: Send + Sync {
    async fn fetch(&self, uri: &str, max_labels: u32, min_confidence: f64) -> FetchOutcome;
}

/// Download an image and sniff its MIME type, shared by all three adapters.
///
/// Returns `Err` for anything that isn't a supported image type; callers
/// convert that into `FetchOutcome::failure`.
pub(crate) async fn download_and_check_mime(
    client: &reqwest::Client,
    uri: &str,
) -> Result<bytes_compat::Bytes, icvsb_core::error::ProviderError> {
    use icvsb_core::error::ProviderError;

    let response = client.get(uri).send().await.map_err(reqwest_to_provider_error)?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let mime: mime::Mime = content_type
        .parse()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);

    if mime.type_() != mime::IMAGE {
        return Err(ProviderError::UnsupportedMediaType(content_type));
    }

    let bytes = response.bytes().await.map_err(reqwest_to_provider_error)?;

    Ok(bytes_compat::Bytes(bytes))
}

/// Maps a transport-level `reqwest::Error` to a [`ProviderError`],
/// distinguishing the per-call deadline (spec §5) from other transport
/// failures so its body comes out as `{"service_error": "timeout"}`.
pub(crate) fn reqwest_to_provider_error(e: reqwest::Error) -> icvsb_core::error::ProviderError {
    if e.is_timeout() {
        icvsb_core::error::ProviderError::Timeout
    } else {
        icvsb_core::error::ProviderError::DownloadFailed(e.to_string())
    }
}

/// Thin wrapper so this crate's public signature doesn't leak `reqwest`'s
/// `bytes` re-export version directly into downstream crates.
pub mod bytes_compat {
    pub struct Bytes(pub reqwest::bytes::Bytes);
}
