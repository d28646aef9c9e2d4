//! Core data types for the feature pipeline.
//!
//! This module defines the candidate, intermediate and row types that flow
//! between the deduplicator, the resolution stages and the sink, along with
//! the run configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Label attached to every row of a batch.
///
/// The label is assigned by the caller per input batch, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Reference (non-phishing) domains
    Legitimate,
    /// Known phishing URLs or domains
    Phishing,
}

impl Label {
    /// Numeric value written to the `label` column.
    pub fn value(self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Phishing => 1,
        }
    }

    /// Build a label from its numeric column value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Label::Legitimate),
            1 => Some(Label::Phishing),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Legitimate => write!(f, "legitimate"),
            Label::Phishing => write!(f, "phishing"),
        }
    }
}

/// How a candidate is reduced to the identity used for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupKey {
    /// Registrable domain from the Public Suffix List (`a.example.co.uk` -> `example.co.uk`)
    #[default]
    Registrable,
    /// The trimmed candidate string itself
    Url,
}

impl std::str::FromStr for DedupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "registrable" | "domain" => Ok(DedupKey::Registrable),
            "url" | "exact" => Ok(DedupKey::Url),
            other => Err(format!(
                "Unknown dedup key '{}', expected 'registrable' or 'url'",
                other
            )),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Registrable => write!(f, "registrable"),
            DedupKey::Url => write!(f, "url"),
        }
    }
}

/// One domain or URL to be turned into a feature row.
///
/// Built by [`Candidate::new`] before dispatch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The input exactly as read (trimmed)
    pub raw: String,
    /// Lower-cased host of the candidate (`None` when no host could be derived)
    pub host: Option<String>,
    /// Registrable domain of the host, or the host itself when the PSL has no answer
    pub registrable: Option<String>,
}

impl Candidate {
    /// Build a candidate, deriving its host and registrable domain.
    pub fn new<S: Into<String>>(raw: S) -> Self {
        let raw = raw.into().trim().to_string();
        let host = crate::utils::extract_host(&raw);
        let registrable = host.as_deref().map(crate::utils::registrable_domain);
        Self {
            raw,
            host,
            registrable,
        }
    }

    /// Identity used for deduplication under the given key.
    pub fn identity(&self, key: DedupKey) -> Option<&str> {
        match key {
            DedupKey::Registrable => self.registrable.as_deref(),
            DedupKey::Url if self.raw.is_empty() => None,
            DedupKey::Url => Some(self.raw.as_str()),
        }
    }

    /// Short label for log lines.
    pub fn display_name(&self) -> &str {
        self.registrable.as_deref().unwrap_or(&self.raw)
    }
}

/// Ordered mapping from feature name to value.
///
/// Insertion order is kept so the output table has a stable column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Set a feature, replacing the value in place if the key already exists.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: f64) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Boolean features are stored as 0/1.
    pub fn insert_flag<K: Into<String>>(&mut self, key: K, flag: bool) {
        self.insert(key, if flag { 1.0 } else { 0.0 });
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut vector = FeatureVector::new();
        for (key, value) in iter {
            vector.insert(key, value);
        }
        vector
    }
}

/// Final output row for one accepted candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Value of the identity column (domain, page URL or file name)
    pub identity: String,
    pub features: FeatureVector,
    pub label: Label,
}

/// Records of one DNS type for one name.
///
/// Each record type is resolved on its own; an empty set for one type says
/// nothing about any other type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    /// Number of entries of the queried type
    pub count: usize,
    /// TTL of every entry in the answer, including CNAME chain entries
    pub ttls: Vec<u32>,
}

impl RecordSet {
    /// Empty set used when the lookup failed or returned nothing.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.count > 0
    }

    /// Arithmetic mean of all TTLs, 0 when there are none.
    pub fn ttl_avg(&self) -> f64 {
        if self.ttls.is_empty() {
            return 0.0;
        }
        let total: u64 = self.ttls.iter().map(|&ttl| u64::from(ttl)).sum();
        total as f64 / self.ttls.len() as f64
    }
}

/// Outcome of the WHOIS part of DNS resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhoisResult {
    pub success: bool,
    /// Whole days until the earliest expiration date, or [`WhoisResult::UNKNOWN_DAYS`]
    pub days_to_expire: i64,
}

impl WhoisResult {
    /// Sentinel for "no usable expiration date".
    pub const UNKNOWN_DAYS: i64 = -1;

    pub fn unknown() -> Self {
        Self {
            success: false,
            days_to_expire: Self::UNKNOWN_DAYS,
        }
    }

    pub fn expires_in(days: i64) -> Self {
        Self {
            success: true,
            days_to_expire: days,
        }
    }
}

impl Default for WhoisResult {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Everything the DNS stage learned about one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsIntermediate {
    /// Canonical domain the lexical features are computed from
    pub domain: String,
    /// Name that answered the existence check (`domain` or `www.` + `domain`)
    pub resolved_name: String,
    pub a: RecordSet,
    pub aaaa: RecordSet,
    pub cname: RecordSet,
    pub mx: RecordSet,
    pub ns: RecordSet,
    pub txt: RecordSet,
    pub whois: WhoisResult,
}

/// Per-script feature vectors gathered for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptIntermediate {
    /// URL of the page the scripts came from
    pub page_url: String,
    pub vectors: Vec<FeatureVector>,
}

/// Configuration options for a pipeline run.
///
/// Defaults: two public resolvers, short DNS deadlines and five WHOIS
/// attempts half a second apart.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum number of candidates in flight
    /// Default: 20, Range: 1-200
    pub concurrency: usize,

    /// Resolvers used for every DNS query
    pub dns_servers: Vec<IpAddr>,

    /// Per-attempt DNS timeout
    pub dns_timeout: Duration,

    /// Overall deadline for one DNS query including resolver retries
    pub dns_lifetime: Duration,

    /// WHOIS attempts before giving up
    pub whois_attempts: u32,

    /// Fixed delay between WHOIS attempts
    pub whois_backoff: Duration,

    /// Deadline for a single WHOIS command
    pub whois_timeout: Duration,

    /// Timeout for fetching a page
    pub page_timeout: Duration,

    /// Timeout for fetching one external script
    pub script_timeout: Duration,

    /// Timeout for each legality-resolution probe
    pub probe_timeout: Duration,

    /// Bounds of the random delay applied after every task
    pub jitter_min: Duration,
    pub jitter_max: Duration,

    /// Cap on the number of candidates read from the main input
    pub limit: Option<usize>,

    /// Cap on the legitimate reference list (after exact dedup)
    pub legit_limit: Option<usize>,

    /// Identity used by the deduplicator of script runs (DNS runs always
    /// use the registrable domain)
    pub dedup: DedupKey,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            dns_servers: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            ],
            dns_timeout: Duration::from_secs(2),
            dns_lifetime: Duration::from_secs(4),
            whois_attempts: 5,
            whois_backoff: Duration::from_millis(500),
            whois_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(8),
            script_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(50),
            limit: None,
            legit_limit: Some(70_001),
            dedup: DedupKey::Registrable,
        }
    }
}

impl PipelineConfig {
    /// Set the concurrency limit, clamped to 1-200.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 200);
        self
    }

    pub fn with_dns_servers(mut self, servers: Vec<IpAddr>) -> Self {
        self.dns_servers = servers;
        self
    }

    pub fn with_whois_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.whois_attempts = attempts.max(1);
        self.whois_backoff = backoff;
        self
    }

    /// Set the jitter bounds; a reversed pair is swapped.
    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min.min(max);
        self.jitter_max = max.max(min);
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_dedup(mut self, dedup: DedupKey) -> Self {
        self.dedup = dedup;
        self
    }
}
