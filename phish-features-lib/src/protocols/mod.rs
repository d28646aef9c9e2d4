//! External query clients.
//!
//! Each client sits behind a trait so the resolution stages can be driven by
//! the real network clients or by in-process doubles.

/// DNS resolution over hickory-resolver
pub mod dns;

/// HTTP page and script fetching
pub mod http;

/// WHOIS expiration lookups via the system `whois` command
pub mod whois;

pub use dns::{DnsAnswer, DnsClient, DnsRecord, HickoryDnsClient, RecordType};
pub use http::{HttpFetcher, HttpResponse, ReqwestFetcher};
pub use whois::{days_until, parse_expiration_dates, WhoisClient, WhoisLookup};
