//! Label/confidence normalization shared by providers, the key engine, and the store.

use std::collections::{BTreeMap, HashSet};

/// Lowercased label -> confidence in `[0, 1]`.
pub type LabelMap = BTreeMap<String, f64>;

/// Lowercase every key of a raw vendor label map, truncated to `max_labels`
/// entries (spec §4.1: "all adapters truncate to `maxLabels` after
/// normalization"). Ties in ordering follow the input iteration order.
pub fn normalize_labels<I>(raw: I, max_labels: u32) -> LabelMap
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut out = LabelMap::new();
    for (label, confidence) in raw {
        if out.len() >= max_labels as usize {
            break;
        }
        out.insert(label.to_lowercase(), confidence.clamp(0.0, 1.0));
    }
    out
}

/// `(A ∪ B) \ (A ∩ B)` over a pair of string sets (spec GLOSSARY).
pub fn symmetric_diff<'a>(a: &'a HashSet<String>, b: &'a HashSet<String>) -> HashSet<&'a str> {
    a.symmetric_difference(b).map(|s| s.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_clamps() {
        let raw = vec![("Cat".to_string(), 1.5), ("DOG".to_string(), -0.2)];
        let normalized = normalize_labels(raw, 100);
        assert_eq!(normalized.get("cat"), Some(&1.0));
        assert_eq!(normalized.get("dog"), Some(&0.0));
    }

    #[test]
    fn normalize_truncates_to_max_labels() {
        let raw = vec![
            ("a".to_string(), 0.1),
            ("b".to_string(), 0.2),
            ("c".to_string(), 0.3),
        ];
        let normalized = normalize_labels(raw, 2);
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn symdiff_matches_set_theory() {
        let a: HashSet<String> = ["cat", "dog"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["dog", "bird"].iter().map(|s| s.to_string()).collect();
        let diff = symmetric_diff(&a, &b);
        assert_eq!(diff.len(), 2);
        assert!(diff.contains("cat"));
        assert!(diff.contains("bird"));
    }
}
