//! DNS resolution stage.
//!
//! Existence is checked with an A query on the canonical name, falling back
//! to the `www.` name. Only a candidate that passes that check gets its
//! secondary record types and WHOIS data looked up; each of those lookups
//! fails on its own without touching the others.

use crate::concurrent::Resolution;
use crate::error::PipelineError;
use crate::fallback::FallbackChain;
use crate::features::domain_lexical_features;
use crate::protocols::{days_until, DnsAnswer, DnsClient, RecordType, WhoisLookup};
use crate::retry::{QueryOutcome, RetryPolicy};
use crate::types::{
    Candidate, DnsIntermediate, FeatureRow, FeatureVector, Label, RecordSet, WhoisResult,
};
use crate::utils::www_variant;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Feature columns of a DNS row, in output order (identity and label excluded).
pub const DNS_FEATURE_NAMES: &[&str] = &[
    "domain_length",
    "subdomain_count",
    "has_suspicious_keywords",
    "A_record_count",
    "ttl_avg",
    "has_multiple_A_records",
    "CNAME_count",
    "MX_count",
    "NS_count",
    "TXT_count",
    "has_AAAA",
    "symbol_ratio",
    "whois_days_to_expire",
    "whois_success",
];

/// Per-candidate DNS and WHOIS resolution.
#[derive(Clone)]
pub struct DnsStage {
    dns: Arc<dyn DnsClient>,
    whois: Arc<dyn WhoisLookup>,
    whois_policy: RetryPolicy,
}

impl DnsStage {
    pub fn new(dns: Arc<dyn DnsClient>, whois: Arc<dyn WhoisLookup>) -> Self {
        Self {
            dns,
            whois,
            whois_policy: RetryPolicy::whois_default(),
        }
    }

    pub fn with_whois_policy(mut self, policy: RetryPolicy) -> Self {
        self.whois_policy = policy;
        self
    }

    /// Resolve one candidate into its DNS intermediate result.
    ///
    /// Returns [`Resolution::Dropped`] when neither the name nor its `www.`
    /// alternate has an A record.
    pub async fn resolve(
        &self,
        candidate: &Candidate,
    ) -> Result<Resolution<DnsIntermediate>, PipelineError> {
        let domain = candidate.registrable.clone().ok_or_else(|| {
            PipelineError::invalid_candidate(&candidate.raw, "no registrable domain")
        })?;

        let chain = FallbackChain::with_alternate(domain.clone(), Some(www_variant(&domain)));
        let existence = chain
            .first_success(|name| {
                let dns = Arc::clone(&self.dns);
                async move { dns.resolve(&name, RecordType::A).await }
            })
            .await;

        let Some((resolved_name, answer)) = existence else {
            debug!("{}: no A record on any alternate", domain);
            return Ok(Resolution::Dropped);
        };

        let a = record_set_of(&answer, RecordType::A);

        let (aaaa, cname, mx, ns, txt, whois) = tokio::join!(
            self.record_set(&resolved_name, RecordType::AAAA),
            self.record_set(&resolved_name, RecordType::CNAME),
            self.record_set(&resolved_name, RecordType::MX),
            self.record_set(&resolved_name, RecordType::NS),
            self.record_set(&resolved_name, RecordType::TXT),
            self.whois_result(&domain),
        );

        Ok(Resolution::Resolved(DnsIntermediate {
            domain,
            resolved_name,
            a,
            aaaa,
            cname,
            mx,
            ns,
            txt,
            whois,
        }))
    }

    /// One isolated secondary lookup; any failure degrades to an empty set.
    async fn record_set(&self, name: &str, record_type: RecordType) -> RecordSet {
        match self.dns.resolve(name, record_type).await {
            Ok(answer) => record_set_of(&answer, record_type),
            Err(err) => {
                debug!("{} lookup for {} failed: {}", record_type, name, err);
                RecordSet::absent()
            }
        }
    }

    async fn whois_result(&self, domain: &str) -> WhoisResult {
        let whois = Arc::clone(&self.whois);
        let outcome = self
            .whois_policy
            .execute(|| {
                let whois = Arc::clone(&whois);
                let domain = domain.to_string();
                async move { whois.lookup(&domain).await }
            })
            .await;

        match outcome {
            QueryOutcome::Success(dates) => match dates.into_iter().min() {
                Some(expiration) => WhoisResult::expires_in(days_until(expiration, Utc::now())),
                None => {
                    debug!("{}: WHOIS response has no expiration date", domain);
                    WhoisResult::unknown()
                }
            },
            QueryOutcome::RetryableFailure(err) | QueryOutcome::TerminalFailure(err) => {
                debug!("{}: WHOIS lookup failed: {}", domain, err);
                WhoisResult::unknown()
            }
        }
    }
}

fn record_set_of(answer: &DnsAnswer, record_type: RecordType) -> RecordSet {
    RecordSet {
        count: answer.count_of(record_type),
        ttls: answer.ttls(),
    }
}

/// Assemble the output row for a resolved DNS candidate.
pub fn dns_feature_row(intermediate: &DnsIntermediate, label: Label) -> FeatureRow {
    let lexical = domain_lexical_features(&intermediate.domain);
    let lexical_value = |key: &str| lexical.get(key).unwrap_or(0.0);

    let mut features = FeatureVector::with_capacity(DNS_FEATURE_NAMES.len());
    features.insert("domain_length", lexical_value("domain_length"));
    features.insert("subdomain_count", lexical_value("subdomain_count"));
    features.insert(
        "has_suspicious_keywords",
        lexical_value("has_suspicious_keywords"),
    );
    features.insert("A_record_count", intermediate.a.count as f64);
    features.insert("ttl_avg", intermediate.a.ttl_avg());
    features.insert_flag("has_multiple_A_records", intermediate.a.count > 1);
    features.insert("CNAME_count", intermediate.cname.count as f64);
    features.insert("MX_count", intermediate.mx.count as f64);
    features.insert("NS_count", intermediate.ns.count as f64);
    features.insert("TXT_count", intermediate.txt.count as f64);
    features.insert_flag("has_AAAA", intermediate.aaaa.is_present());
    features.insert("symbol_ratio", lexical_value("symbol_ratio"));
    features.insert(
        "whois_days_to_expire",
        intermediate.whois.days_to_expire as f64,
    );
    features.insert_flag("whois_success", intermediate.whois.success);

    FeatureRow {
        identity: intermediate.domain.clone(),
        features,
        label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intermediate() -> DnsIntermediate {
        DnsIntermediate {
            domain: "example.com".to_string(),
            resolved_name: "example.com".to_string(),
            a: RecordSet {
                count: 2,
                ttls: vec![300, 600],
            },
            aaaa: RecordSet::absent(),
            cname: RecordSet::absent(),
            mx: RecordSet {
                count: 1,
                ttls: vec![3600],
            },
            ns: RecordSet {
                count: 2,
                ttls: vec![86400, 86400],
            },
            txt: RecordSet::absent(),
            whois: WhoisResult::unknown(),
        }
    }

    #[test]
    fn test_row_columns_in_order() {
        let row = dns_feature_row(&intermediate(), Label::Legitimate);
        assert_eq!(row.identity, "example.com");
        assert_eq!(row.features.keys().collect::<Vec<_>>(), DNS_FEATURE_NAMES.to_vec());
    }

    #[test]
    fn test_row_values() {
        let row = dns_feature_row(&intermediate(), Label::Phishing);

        assert_eq!(row.features.get("A_record_count"), Some(2.0));
        assert_eq!(row.features.get("has_multiple_A_records"), Some(1.0));
        assert_eq!(row.features.get("ttl_avg"), Some(450.0));
        assert_eq!(row.features.get("MX_count"), Some(1.0));
        assert_eq!(row.features.get("has_AAAA"), Some(0.0));
        assert_eq!(row.features.get("whois_days_to_expire"), Some(-1.0));
        assert_eq!(row.features.get("whois_success"), Some(0.0));
        assert_eq!(row.label, Label::Phishing);
    }
}
