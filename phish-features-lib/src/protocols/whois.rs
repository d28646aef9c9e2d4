//! WHOIS lookups for domain expiration dates.
//!
//! The client shells out to the system `whois` command and extracts every
//! expiration date it can find in the free-text response. Registries format
//! these records very differently, so parsing is pattern based.

use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::time::Duration;
use tokio::process::Command;

/// Lookup of the expiration date(s) registered for a domain.
#[async_trait]
pub trait WhoisLookup: Send + Sync {
    /// All expiration dates found for `domain`. An empty list means the
    /// lookup worked but the response carried no usable date.
    async fn lookup(&self, domain: &str) -> Result<Vec<DateTime<Utc>>, PipelineError>;
}

/// WHOIS client backed by the system's `whois` command.
#[derive(Debug, Clone)]
pub struct WhoisClient {
    /// Deadline for one `whois` invocation
    timeout: Duration,
}

impl WhoisClient {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn execute_whois_command(&self, domain: &str) -> Result<String, PipelineError> {
        let output = Command::new("whois")
            .arg(domain)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::whois(
                    domain,
                    format!(
                        "Failed to execute whois command: {}. Make sure 'whois' is installed.",
                        e
                    ),
                )
            })?;

        let text = String::from_utf8_lossy(&output.stdout).to_string();

        if is_rate_limited(&text) {
            return Err(PipelineError::rate_limited(
                "whois",
                format!("query for '{}' was throttled", domain),
            ));
        }

        if text.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::whois(
                domain,
                format!("empty response ({})", stderr.trim()),
            ));
        }

        Ok(text)
    }
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WhoisLookup for WhoisClient {
    async fn lookup(&self, domain: &str) -> Result<Vec<DateTime<Utc>>, PipelineError> {
        match tokio::time::timeout(self.timeout, self.execute_whois_command(domain)).await {
            Ok(Ok(text)) => Ok(parse_expiration_dates(&text)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::timeout(
                format!("WHOIS query for {}", domain),
                self.timeout,
            )),
        }
    }
}

/// Field names that introduce an expiration date, lower-cased.
const EXPIRATION_FIELDS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
    "expiry date",
    "expiration time",
    "expires on",
    "expires",
    "expire",
    "paid-till",
    "renewal date",
    "valid until",
];

/// Extract every expiration date from a raw WHOIS response.
pub fn parse_expiration_dates(response: &str) -> Vec<DateTime<Utc>> {
    let mut dates = Vec::new();

    for line in response.lines() {
        let line = line.trim();
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };

        let field = field.trim().to_lowercase();
        if !EXPIRATION_FIELDS.contains(&field.as_str()) {
            continue;
        }

        if let Some(date) = parse_whois_date(value.trim()) {
            if !dates.contains(&date) {
                dates.push(date);
            }
        }
    }

    dates
}

/// Parse one WHOIS date value in any of the common registry formats.
pub fn parse_whois_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().trim_end_matches('.');
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }

    // Some registries append a zone name or extra words after the date
    let first_token = value.split_whitespace().next().unwrap_or(value);

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%d-%b-%Y %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d-%b-%Y", "%d.%m.%Y", "%d/%m/%Y", "%Y%m%d",
    ];
    for candidate in [value, first_token] {
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
        }
    }

    None
}

/// Whole days from `now` until `expiration`, floored.
pub fn days_until(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiration - now).num_seconds().div_euclid(86_400)
}

/// Check if the WHOIS output indicates rate limiting.
fn is_rate_limited(output: &str) -> bool {
    let output_lower = output.to_lowercase();
    let rate_limit_patterns = [
        "rate limit exceeded",
        "too many requests",
        "quota exceeded",
        "limit exceeded",
        "rate-limited",
        "query rate",
    ];

    rate_limit_patterns
        .iter()
        .any(|pattern| output_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_expiration_dates_verisign() {
        let response = "   Domain Name: EXAMPLE.COM\n   Registry Domain ID: 2336799_DOMAIN_COM-VRSN\n   Updated Date: 2024-08-14T07:01:34Z\n   Registry Expiry Date: 2025-08-13T04:00:00Z\n   Registrar: RESERVED-Internet Assigned Numbers Authority\n";

        let dates = parse_expiration_dates(response);
        assert_eq!(
            dates,
            vec![Utc.with_ymd_and_hms(2025, 8, 13, 4, 0, 0).unwrap()]
        );
    }

    #[test]
    fn test_parse_expiration_dates_multiple_formats() {
        let response = "Registry Expiry Date: 2030-01-02T00:00:00Z\nRegistrar Registration Expiration Date: 2029-12-31T05:00:00.0Z\npaid-till: 2031.03.04\nExpires On: 15-Jan-2032\n";

        let dates = parse_expiration_dates(response);
        assert_eq!(dates.len(), 4);

        let earliest = dates.iter().min().copied();
        assert_eq!(earliest, Some(Utc.with_ymd_and_hms(2029, 12, 31, 5, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_expiration_dates_ignores_other_fields() {
        let response = "Creation Date: 1995-08-14T04:00:00Z\nUpdated Date: 2024-01-01\nexpire: not a date\n";
        assert!(parse_expiration_dates(response).is_empty());
    }

    #[test]
    fn test_parse_whois_date_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(parse_whois_date("2026-03-09"), Some(expected));
        assert_eq!(parse_whois_date("2026/03/09"), Some(expected));
        assert_eq!(parse_whois_date("09-Mar-2026"), Some(expected));
        assert_eq!(parse_whois_date("09.03.2026"), Some(expected));
        assert_eq!(parse_whois_date("2026-03-09 (YYYY-MM-DD)"), Some(expected));
        assert_eq!(parse_whois_date(""), None);
    }

    #[test]
    fn test_days_until_floors() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 11, 11, 0, 0).unwrap();
        assert_eq!(days_until(later, now), 9);

        let past = Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(days_until(past, now), -1);
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited("Rate limit exceeded. Try again later."));
        assert!(is_rate_limited("Too many requests from your IP."));
        assert!(!is_rate_limited("Registry Expiry Date: 2025-08-13T04:00:00Z"));
    }

    #[test]
    fn test_whois_client_creation() {
        let client = WhoisClient::new();
        assert_eq!(client.timeout, Duration::from_secs(10));

        let custom_client = WhoisClient::with_timeout(Duration::from_secs(3));
        assert_eq!(custom_client.timeout, Duration::from_secs(3));
    }
}
