//! Feature extraction and aggregation.
//!
//! Extractors are pure functions of their input text. The aggregator folds
//! several per-script vectors of one page into a single page-level vector.

pub mod html;
pub mod javascript;
pub mod lexical;

pub use html::{html_page_features, PageDocument, ScriptTag, HTML_FEATURE_NAMES};
pub use javascript::{JsFeatureExtractor, JS_FEATURE_NAMES};
pub use lexical::{domain_lexical_features, SUSPICIOUS_KEYWORDS};

use crate::types::FeatureVector;
use std::collections::HashMap;

/// `extract(text) -> mapping<string, number>` with a fixed key set.
pub trait FeatureExtractor: Send + Sync {
    /// Keys produced by [`FeatureExtractor::extract`], in output order.
    fn feature_names(&self) -> Vec<String>;

    fn extract(&self, text: &str) -> FeatureVector;
}

/// Per-key maximum over a list of feature vectors.
///
/// Key order follows the first vector; keys that only appear in later
/// vectors are appended. Returns `None` for an empty list, which callers
/// treat as "drop the candidate".
pub fn aggregate_max(vectors: &[FeatureVector]) -> Option<FeatureVector> {
    let (first, rest) = vectors.split_first()?;
    let mut aggregated = first.clone();

    for vector in rest {
        for (key, value) in vector.iter() {
            match aggregated.get(key) {
                Some(current) if current >= value => {}
                _ => aggregated.insert(key, value),
            }
        }
    }

    Some(aggregated)
}

/// Shannon entropy (base 2) of the characters of `text`; 0 for empty text.
pub fn shannon_entropy(text: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    -counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            p * p.log2()
        })
        .sum::<f64>()
}
