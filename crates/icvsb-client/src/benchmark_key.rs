//! The equivalence engine behind `BenchmarkKey.valid_against` (spec §4.3):
//! an 8-reason, order-significant comparison between two benchmarked
//! batches, plus a 9th check of a single response against an existing key.

use icvsb_core::error::{ConfidenceDelta, InvalidKeyError};
use icvsb_core::labels::{symmetric_diff, LabelMap};
use icvsb_core::types::{BenchmarkKey, Service};
use std::collections::HashSet;

/// Everything `valid_against` needs about one benchmarked batch: the key's
/// scalar configuration plus the per-URI outcome of every request in it.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub service: Service,
    pub max_labels: u32,
    pub min_confidence: f64,
    pub delta_labels: u32,
    pub delta_confidence: f64,
    /// One entry per request, in the order the batch was sent.
    pub outcomes: Vec<UriOutcome>,
}

#[derive(Debug, Clone)]
pub struct UriOutcome {
    pub uri: String,
    pub success: bool,
    pub labels: LabelMap,
}

impl BatchSnapshot {
    fn uris(&self) -> HashSet<String> {
        self.outcomes.iter().map(|o| o.uri.clone()).collect()
    }

    fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Compares two batches for benchmark-key equivalence, in the spec §4.3
/// check order. Returns the *first* violated reason, short-circuiting on
/// cheaper checks before the per-URI label/confidence comparisons.
pub fn valid_against(self_snap: &BatchSnapshot, other_snap: &BatchSnapshot) -> Result<(), InvalidKeyError> {
    if self_snap.service != other_snap.service {
        return Err(InvalidKeyError::ServiceMismatch {
            self_service: self_snap.service.to_string(),
            other_service: other_snap.service.to_string(),
        });
    }

    let self_uris = self_snap.uris();
    let other_uris = other_snap.uris();
    let dataset_diff = self_uris.symmetric_difference(&other_uris).count();
    if dataset_diff > 0 {
        return Err(InvalidKeyError::DatasetMismatch(dataset_diff));
    }

    if !self_snap.all_succeeded() || !other_snap.all_succeeded() {
        return Err(InvalidKeyError::SuccessMismatch);
    }

    if self_snap.max_labels != other_snap.max_labels {
        return Err(InvalidKeyError::MaxLabelsMismatch {
            self_value: self_snap.max_labels,
            other_value: other_snap.max_labels,
        });
    }

    if (self_snap.min_confidence - other_snap.min_confidence).abs() > f64::EPSILON {
        return Err(InvalidKeyError::MinConfidenceMismatch {
            self_value: self_snap.min_confidence,
            other_value: other_snap.min_confidence,
        });
    }

    if self_snap.outcomes.len() != other_snap.outcomes.len() {
        return Err(InvalidKeyError::ResponseLengthMismatch {
            self_len: self_snap.outcomes.len(),
            other_len: other_snap.outcomes.len(),
        });
    }

    let mut other_by_uri = std::collections::HashMap::new();
    for outcome in &other_snap.outcomes {
        other_by_uri.insert(outcome.uri.as_str(), outcome);
    }

    for outcome in &self_snap.outcomes {
        let Some(other_outcome) = other_by_uri.get(outcome.uri.as_str()) else {
            continue;
        };
        let self_labels: HashSet<String> = outcome.labels.keys().cloned().collect();
        let other_labels: HashSet<String> = other_outcome.labels.keys().cloned().collect();
        let diff = symmetric_diff(&self_labels, &other_labels);
        if diff.len() > self_snap.delta_labels as usize {
            return Err(InvalidKeyError::LabelDeltaMismatch {
                uri: outcome.uri.clone(),
                symdiff_size: diff.len(),
                allowed: self_snap.delta_labels,
            });
        }
    }

    let mut confidence_deltas = Vec::new();
    for outcome in &self_snap.outcomes {
        let Some(other_outcome) = other_by_uri.get(outcome.uri.as_str()) else {
            continue;
        };
        for (label, confidence) in &outcome.labels {
            if let Some(other_confidence) = other_outcome.labels.get(label) {
                let delta = (confidence - other_confidence).abs();
                if delta > self_snap.delta_confidence {
                    confidence_deltas.push(ConfidenceDelta {
                        label: label.clone(),
                        delta,
                    });
                }
            }
        }
    }
    if !confidence_deltas.is_empty() {
        return Err(InvalidKeyError::ConfidenceDeltaMismatch(confidence_deltas));
    }

    Ok(())
}

/// Check #9: does a single response still satisfy an existing key's
/// `expected_labels` (spec §4.3 last bullet)?
pub fn valid_against_response(key: &BenchmarkKey, labels: &LabelMap) -> Result<(), InvalidKeyError> {
    for expected in &key.expected_labels {
        if !labels.contains_key(expected) {
            return Err(InvalidKeyError::ExpectedLabelsMismatch(expected.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(uri: &str, labels: &[(&str, f64)]) -> UriOutcome {
        UriOutcome {
            uri: uri.to_string(),
            success: true,
            labels: labels.iter().map(|(l, c)| (l.to_string(), *c)).collect(),
        }
    }

    fn snapshot(outcomes: Vec<UriOutcome>) -> BatchSnapshot {
        BatchSnapshot {
            service: Service::Google,
            max_labels: 10,
            min_confidence: 0.5,
            delta_labels: 0,
            delta_confidence: 0.05,
            outcomes,
        }
    }

    #[test]
    fn identical_batches_are_valid() {
        let a = snapshot(vec![outcome("https://x/cat.jpg", &[("cat", 0.9)])]);
        let b = snapshot(vec![outcome("https://x/cat.jpg", &[("cat", 0.9)])]);
        assert!(valid_against(&a, &b).is_ok());
    }

    #[test]
    fn service_mismatch_short_circuits_first() {
        let mut a = snapshot(vec![outcome("https://x/cat.jpg", &[("cat", 0.9)])]);
        a.service = Service::Amazon;
        let b = snapshot(vec![]);
        assert!(matches!(
            valid_against(&a, &b),
            Err(InvalidKeyError::ServiceMismatch { .. })
        ));
    }

    #[test]
    fn label_drift_beyond_delta_is_rejected() {
        let a = snapshot(vec![outcome("https://x/cat.jpg", &[("cat", 0.9)])]);
        let b = snapshot(vec![outcome(
            "https://x/cat.jpg",
            &[("cat", 0.9), ("dog", 0.8)],
        )]);
        assert!(matches!(
            valid_against(&a, &b),
            Err(InvalidKeyError::LabelDeltaMismatch { .. })
        ));
    }

    #[test]
    fn confidence_drift_beyond_delta_is_rejected() {
        let a = snapshot(vec![outcome("https://x/cat.jpg", &[("cat", 0.9)])]);
        let b = snapshot(vec![outcome("https://x/cat.jpg", &[("cat", 0.5)])]);
        assert!(matches!(
            valid_against(&a, &b),
            Err(InvalidKeyError::ConfidenceDeltaMismatch(_))
        ));
    }

    #[test]
    fn expected_labels_missing_is_rejected() {
        let key = BenchmarkKey {
            id: 1,
            service: Service::Google,
            batch_request_id: 1,
            severity: icvsb_core::types::Severity::Info,
            created_at: chrono::Utc::now(),
            expired: false,
            delta_labels: 0,
            delta_confidence: 0.05,
            max_labels: 10,
            min_confidence: 0.5,
            expected_labels: vec!["cat".to_string()],
        };
        let labels: LabelMap = [("dog".to_string(), 0.9)].into_iter().collect();
        assert!(matches!(
            valid_against_response(&key, &labels),
            Err(InvalidKeyError::ExpectedLabelsMismatch(_))
        ));
    }
}
