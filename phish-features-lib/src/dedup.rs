//! Run-scoped deduplication of candidates.
//!
//! The [`Deduplicator`] owns the set of canonical identities seen during one
//! batch run. Admission is a single test-and-insert under one lock, so two
//! workers presenting the same identity at the same time can never both be
//! admitted.

use crate::types::{Candidate, DedupKey};
use std::collections::HashSet;
use std::sync::Mutex;

/// Result of presenting a candidate to the [`Deduplicator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First occurrence of this identity in the run
    Admitted,
    /// Identity already admitted earlier in the run
    Duplicate,
    /// No identity could be derived from the candidate
    Invalid,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Atomic at-most-once gate keyed by canonical identity.
#[derive(Debug, Default)]
pub struct Deduplicator {
    key: DedupKey,
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new(key: DedupKey) -> Self {
        Self {
            key,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn key(&self) -> DedupKey {
        self.key
    }

    /// Admit a candidate if its identity has not been seen in this run.
    pub fn admit(&self, candidate: &Candidate) -> Admission {
        let Some(identity) = candidate.identity(self.key) else {
            return Admission::Invalid;
        };

        // A poisoned lock still holds a consistent set: inserts are the only mutation.
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if seen.insert(identity.to_string()) {
            Admission::Admitted
        } else {
            Admission::Duplicate
        }
    }

    /// Number of distinct identities admitted so far.
    pub fn seen_count(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_second_equivalent_url_is_rejected() {
        let dedup = Deduplicator::new(DedupKey::Registrable);

        assert_eq!(
            dedup.admit(&Candidate::new("http://a.example.com")),
            Admission::Admitted
        );
        assert_eq!(
            dedup.admit(&Candidate::new("https://example.com")),
            Admission::Duplicate
        );
        assert_eq!(dedup.seen_count(), 1);
    }

    #[test]
    fn test_url_key_keeps_distinct_paths() {
        let dedup = Deduplicator::new(DedupKey::Url);

        assert!(dedup.admit(&Candidate::new("https://example.com/a")).is_admitted());
        assert!(dedup.admit(&Candidate::new("https://example.com/b")).is_admitted());
        assert_eq!(
            dedup.admit(&Candidate::new(" https://example.com/a ")),
            Admission::Duplicate
        );
    }

    #[test]
    fn test_invalid_candidate_is_not_recorded() {
        let dedup = Deduplicator::new(DedupKey::Registrable);

        assert_eq!(dedup.admit(&Candidate::new("")), Admission::Invalid);
        assert_eq!(dedup.admit(&Candidate::new("http://")), Admission::Invalid);
        assert_eq!(dedup.seen_count(), 0);
    }

    #[test]
    fn test_concurrent_admit_is_atomic() {
        let dedup = Arc::new(Deduplicator::new(DedupKey::Registrable));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || {
                    let candidate = Candidate::new(format!("https://host{}.example.com", i));
                    dedup.admit(&candidate)
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|admission| admission.is_admitted())
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(dedup.seen_count(), 1);
    }
}
