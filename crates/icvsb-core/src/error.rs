//! Typed error kinds (spec §7). These are values, not exceptions: they never
//! cross an `await` boundary as a panic and are translated to HTTP status
//! codes only at the server edge.

use thiserror::Error;

/// 400-at-HTTP validation failures (spec §7, component 1 validators).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("'{0}' is not an integer")]
    NotInteger(String),
    #[error("'{0}' is not a positive float")]
    NotPositiveFloat(String),
    #[error("'{0}' is not a valid cron expression")]
    NotCronLine(String),
    #[error("'{0}' is not a well-formed absolute URI")]
    NotURI(String),
    #[error("'{0}' is not a valid RFC 2616 HTTP date")]
    NotHttpDate(String),
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),
    #[error("warning_callback_uri is required when severity is 'warning'")]
    MissingWarningCallback,
}

/// The eight key-validity failure reasons (spec §4.3), in check order.
///
/// Variant order matches the short-circuit check order: `valid_against`
/// returns the first one that applies.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvalidKeyError {
    #[error("service mismatch: {self_service} vs {other_service}")]
    ServiceMismatch {
        self_service: String,
        other_service: String,
    },
    #[error("dataset mismatch: {0} uri(s) differ")]
    DatasetMismatch(usize),
    #[error("one or both batches were not fully successful")]
    SuccessMismatch,
    #[error("max_labels mismatch: {self_value} vs {other_value}")]
    MaxLabelsMismatch { self_value: u32, other_value: u32 },
    #[error("min_confidence mismatch: {self_value} vs {other_value}")]
    MinConfidenceMismatch { self_value: f64, other_value: f64 },
    #[error("response length mismatch: {self_len} vs {other_len}")]
    ResponseLengthMismatch { self_len: usize, other_len: usize },
    #[error("label delta mismatch for '{uri}': {symdiff_size} > {allowed}")]
    LabelDeltaMismatch {
        uri: String,
        symdiff_size: usize,
        allowed: u32,
    },
    #[error("confidence delta mismatch: {0:?}")]
    ConfidenceDeltaMismatch(Vec<ConfidenceDelta>),
    #[error("expected label '{0}' missing from response")]
    ExpectedLabelsMismatch(String),
}

impl InvalidKeyError {
    /// Stable, machine-readable reason code (spec §4.3, §8 scenario 5: the
    /// 412 body must contain `EXPECTED_LABELS_MISMATCH`). Surfaced
    /// alongside the prose `Display` message, never in place of it.
    pub fn code(&self) -> &'static str {
        match self {
            InvalidKeyError::ServiceMismatch { .. } => "SERVICE_MISMATCH",
            InvalidKeyError::DatasetMismatch(_) => "DATASET_MISMATCH",
            InvalidKeyError::SuccessMismatch => "SUCCESS_MISMATCH",
            InvalidKeyError::MaxLabelsMismatch { .. } => "MAX_LABELS_MISMATCH",
            InvalidKeyError::MinConfidenceMismatch { .. } => "MIN_CONFIDENCE_MISMATCH",
            InvalidKeyError::ResponseLengthMismatch { .. } => "RESPONSE_LENGTH_MISMATCH",
            InvalidKeyError::LabelDeltaMismatch { .. } => "LABEL_DELTA_MISMATCH",
            InvalidKeyError::ConfidenceDeltaMismatch(_) => "CONFIDENCE_DELTA_MISMATCH",
            InvalidKeyError::ExpectedLabelsMismatch(_) => "EXPECTED_LABELS_MISMATCH",
        }
    }
}

/// One entry of a `ConfidenceDeltaMismatch`'s detail list (spec §4.3 rule 7).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfidenceDelta {
    pub label: String,
    pub delta: f64,
}

/// Provider-side failures (spec §4.1, §7). All of these collapse into
/// `Response { success: false }` inside `RequestClient::send_uri` and never
/// escape it.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("failed to download image: {0}")]
    DownloadFailed(String),
    #[error("timeout")]
    Timeout,
    #[error("{class} - {message}")]
    ServiceError { class: String, message: String },
}

impl ProviderError {
    /// The `{service_error: "<class> - <message>"}` body shape of spec §4.1.
    pub fn as_service_error_json(&self) -> serde_json::Value {
        let text = match self {
            ProviderError::UnsupportedMediaType(m) => {
                format!("UnsupportedMediaType - {m}")
            }
            ProviderError::DownloadFailed(m) => format!("DownloadFailed - {m}"),
            ProviderError::Timeout => "timeout".to_string(),
            ProviderError::ServiceError { class, message } => format!("{class} - {message}"),
        };
        serde_json::json!({ "service_error": text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_labels_mismatch_reports_its_code() {
        let err = InvalidKeyError::ExpectedLabelsMismatch("dog".to_string());
        assert_eq!(err.code(), "EXPECTED_LABELS_MISMATCH");
    }

    #[test]
    fn service_mismatch_reports_its_code() {
        let err = InvalidKeyError::ServiceMismatch {
            self_service: "google".to_string(),
            other_service: "amazon".to_string(),
        };
        assert_eq!(err.code(), "SERVICE_MISMATCH");
    }
}
