//! Lexical features computed from a domain name alone.

use crate::types::FeatureVector;

/// Substrings that mark a domain as suspicious.
pub const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "login", "secure", "verify", "update", "account", "bank", "paypal",
];

const SYMBOLS: &[char] = &['.', '/', '-', '_', '=', '+', '@', ':', '?', '&', '%'];

/// `domain_length`, `subdomain_count`, `has_suspicious_keywords` and
/// `symbol_ratio` for a canonical domain.
///
/// `symbol_ratio` is the raw count of symbol characters, kept under its
/// historical column name.
pub fn domain_lexical_features(domain: &str) -> FeatureVector {
    let lower = domain.to_lowercase();
    let dots = domain.matches('.').count() as f64;

    let mut features = FeatureVector::with_capacity(4);
    features.insert("domain_length", domain.chars().count() as f64);
    features.insert("subdomain_count", dots - 1.0);
    features.insert_flag(
        "has_suspicious_keywords",
        SUSPICIOUS_KEYWORDS.iter().any(|kw| lower.contains(kw)),
    );
    features.insert(
        "symbol_ratio",
        domain.chars().filter(|c| SYMBOLS.contains(c)).count() as f64,
    );
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_domain() {
        let features = domain_lexical_features("example.com");
        assert_eq!(features.get("domain_length"), Some(11.0));
        assert_eq!(features.get("subdomain_count"), Some(0.0));
        assert_eq!(features.get("has_suspicious_keywords"), Some(0.0));
        assert_eq!(features.get("symbol_ratio"), Some(1.0));
    }

    #[test]
    fn test_suspicious_domain() {
        let features = domain_lexical_features("secure-Login.bank-example.co.uk");
        assert_eq!(features.get("subdomain_count"), Some(2.0));
        assert_eq!(features.get("has_suspicious_keywords"), Some(1.0));
        // three dots, two hyphens
        assert_eq!(features.get("symbol_ratio"), Some(5.0));
    }

    #[test]
    fn test_single_label_has_negative_subdomain_count() {
        let features = domain_lexical_features("localhost");
        assert_eq!(features.get("subdomain_count"), Some(-1.0));
    }
}
