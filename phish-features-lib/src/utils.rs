//! Utility functions for host extraction and name handling.
//!
//! This module turns raw candidate strings (bare domains or full URLs) into
//! lower-cased hosts and registrable domains, and builds the alternate names
//! used by the fallback chains.

use crate::types::DedupKey;
use std::net::IpAddr;
use url::Url;

/// Extract the lower-cased host of a domain or URL.
///
/// Inputs without a scheme are treated as `http://` URLs so that
/// `example.com/login` and `http://example.com/login` agree. A trailing root
/// dot is dropped.
pub fn extract_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("http://{}", trimmed)).ok()?
    };

    let host = parsed.host_str()?;
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_lowercase();

    if host.is_empty() || !is_plausible_host(&host) {
        return None;
    }

    Some(host)
}

/// Registrable domain of a host (`a.example.co.uk` -> `example.co.uk`).
///
/// IP addresses and names the Public Suffix List cannot split are returned
/// unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.parse::<IpAddr>().is_ok() {
        return host;
    }

    match psl::domain_str(&host) {
        Some(domain) => domain.to_string(),
        None => host,
    }
}

/// Canonical identity of a raw candidate under the given key.
///
/// Returns `None` when the candidate has no usable host (or is empty for
/// [`DedupKey::Url`]).
pub fn canonical_identity(raw: &str, key: DedupKey) -> Option<String> {
    match key {
        DedupKey::Registrable => extract_host(raw).map(|host| registrable_domain(&host)),
        DedupKey::Url => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}

/// `www.`-prefixed alternate of a name. The prefix is added even when the
/// name already starts with `www.`.
pub fn www_variant(name: &str) -> String {
    format!("www.{}", name)
}

/// Page URLs probed, in order, when resolving a bare domain to a live page.
pub fn legal_url_variants(domain: &str) -> Vec<String> {
    let bare = domain.trim().trim_start_matches("www.");
    vec![
        format!("https://{}", bare),
        format!("https://www.{}", bare),
        format!("http://{}", bare),
        format!("http://www.{}", bare),
    ]
}

/// Page URL for a candidate that is fetched as-is.
///
/// Scheme-less input gets `http://`, matching [`extract_host`].
pub fn page_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Basic structural check on an extracted host.
fn is_plausible_host(host: &str) -> bool {
    if host.len() > 253 {
        return false;
    }

    if host.parse::<IpAddr>().is_ok() {
        return true;
    }

    if host.starts_with('.') || host.starts_with('-') || host.ends_with('-') {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    })
}
