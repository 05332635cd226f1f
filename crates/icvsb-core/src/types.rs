//! The closed, seeded enumerations and plain data records of the data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A vendor adapter identity. The set is closed and seeded at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Google,
    Amazon,
    Azure,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Google, Service::Amazon, Service::Azure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Google => "google",
            Service::Amazon => "amazon",
            Service::Azure => "azure",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Service::Google),
            "amazon" => Ok(Service::Amazon),
            "azure" => Ok(Service::Azure),
            other => Err(ValidationError::UnknownService(other.to_string())),
        }
    }
}

/// Policy controlling what a caller sees when a key is invalid (spec §4.4, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Exception,
    Warning,
    Info,
    None,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Exception,
        Severity::Warning,
        Severity::Info,
        Severity::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Exception => "exception",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::None => "none",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exception" => Ok(Severity::Exception),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "none" => Ok(Severity::None),
            other => Err(ValidationError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Groups N single requests made together (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// One call against one URI (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub service: Service,
    pub batch_request_id: Option<i64>,
    pub uri: String,
    pub created_at: DateTime<Utc>,
}

/// Stored raw vendor body + success flag (spec §3).
///
/// `body` holds the provider's normalized JSON: `{"labels": {...}}` on
/// success, `{"service_error": "<class> - <message>"}` on failure. Vendor
/// wire formats are out of scope (spec §1 Non-goals); this is the
/// normalized shape the `LabelProvider` contract (spec §4.1) produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub request_id: i64,
    pub benchmark_key_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub body: Option<Vec<u8>>,
    pub success: bool,
}

impl Response {
    /// Decoded `labels()`: empty when `success` is false, lowercased
    /// label -> confidence otherwise (spec §8 round-trip invariant).
    pub fn labels(&self) -> crate::labels::LabelMap {
        if !self.success {
            return crate::labels::LabelMap::new();
        }
        let Some(body) = &self.body else {
            return crate::labels::LabelMap::new();
        };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return crate::labels::LabelMap::new();
        };
        let Some(labels) = value.get("labels").and_then(|v| v.as_object()) else {
            return crate::labels::LabelMap::new();
        };
        labels
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|conf| (k.to_lowercase(), conf)))
            .collect()
    }
}

/// Reference point for drift detection (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkKey {
    pub id: i64,
    pub service: Service,
    pub batch_request_id: i64,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub expired: bool,
    pub delta_labels: u32,
    pub delta_confidence: f64,
    pub max_labels: u32,
    pub min_confidence: f64,
    /// Ordered set of lowercased strings.
    pub expected_labels: Vec<String>,
}
