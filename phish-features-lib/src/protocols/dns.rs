//! DNS client used by the DNS resolution stage.
//!
//! [`HickoryDnsClient`] queries a fixed set of nameservers with a per-attempt
//! timeout and an overall lifetime per query. Answers keep every record of
//! the response (CNAME chain entries included) so the stage can average TTLs
//! over the full answer.

use crate::error::PipelineError;
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::RecordType as WireRecordType;
use hickory_resolver::TokioAsyncResolver;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Record types the pipeline asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    TXT,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::TXT => "TXT",
        }
    }

    fn wire(self) -> WireRecordType {
        match self {
            RecordType::A => WireRecordType::A,
            RecordType::AAAA => WireRecordType::AAAA,
            RecordType::CNAME => WireRecordType::CNAME,
            RecordType::MX => WireRecordType::MX,
            RecordType::NS => WireRecordType::NS,
            RecordType::TXT => WireRecordType::TXT,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of a DNS answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub record_type: RecordType,
    pub ttl: u32,
}

/// Answer to one query: the records of the queried type plus any chain
/// entries (CNAMEs) that led to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsAnswer {
    pub records: Vec<DnsRecord>,
}

impl DnsAnswer {
    pub fn new(records: Vec<DnsRecord>) -> Self {
        Self { records }
    }

    /// Number of records of the given type.
    pub fn count_of(&self, record_type: RecordType) -> usize {
        self.records
            .iter()
            .filter(|record| record.record_type == record_type)
            .count()
    }

    /// TTL of every record in the answer.
    pub fn ttls(&self) -> Vec<u32> {
        self.records.iter().map(|record| record.ttl).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `resolve(name, record_type) -> answer | error`.
///
/// Nameservers, timeout and lifetime are fixed when the client is built.
/// A name that exists but has no records of the type is reported as
/// [`PipelineError::NoRecords`].
#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn resolve(&self, name: &str, record_type: RecordType)
        -> Result<DnsAnswer, PipelineError>;
}

/// DNS client backed by hickory-resolver.
pub struct HickoryDnsClient {
    resolver: TokioAsyncResolver,
    lifetime: Duration,
}

impl HickoryDnsClient {
    /// Build a resolver for the given nameservers (port 53, UDP with TCP fallback).
    pub fn new(nameservers: &[IpAddr], timeout: Duration, lifetime: Duration) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(nameservers, 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        // As many attempts as fit in the lifetime, at least one
        opts.attempts = (lifetime.as_millis() / timeout.as_millis().max(1)).max(1) as usize;
        opts.use_hosts_file = false;
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            lifetime,
        }
    }

    pub fn from_config(config: &crate::PipelineConfig) -> Self {
        Self::new(&config.dns_servers, config.dns_timeout, config.dns_lifetime)
    }
}

#[async_trait]
impl DnsClient for HickoryDnsClient {
    async fn resolve(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<DnsAnswer, PipelineError> {
        // Fully qualified so no search domains are appended
        let fqdn = if name.ends_with('.') {
            name.to_string()
        } else {
            format!("{}.", name)
        };

        let lookup = tokio::time::timeout(
            self.lifetime,
            self.resolver.lookup(fqdn.as_str(), record_type.wire()),
        )
        .await
        .map_err(|_| {
            PipelineError::timeout(format!("DNS {} query for {}", record_type, name), self.lifetime)
        })?
        .map_err(|err| map_resolve_error(name, record_type, err))?;

        let records: Vec<DnsRecord> = lookup
            .records()
            .iter()
            .filter_map(|record| {
                let record_type = match record.record_type() {
                    WireRecordType::A => RecordType::A,
                    WireRecordType::AAAA => RecordType::AAAA,
                    WireRecordType::CNAME => RecordType::CNAME,
                    WireRecordType::MX => RecordType::MX,
                    WireRecordType::NS => RecordType::NS,
                    WireRecordType::TXT => RecordType::TXT,
                    _ => return None,
                };
                Some(DnsRecord {
                    record_type,
                    ttl: record.ttl(),
                })
            })
            .collect();

        if records.iter().all(|record| record.record_type != record_type) {
            return Err(PipelineError::no_records(name, record_type.as_str()));
        }

        Ok(DnsAnswer::new(records))
    }
}

fn map_resolve_error(name: &str, record_type: RecordType, err: ResolveError) -> PipelineError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => {
            PipelineError::no_records(name, record_type.as_str())
        }
        ResolveErrorKind::Timeout => {
            PipelineError::timeout(format!("DNS {} query for {}", record_type, name), Duration::ZERO)
        }
        _ => PipelineError::dns(name, record_type.as_str(), err.to_string()),
    }
}
