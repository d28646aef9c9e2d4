//! Error handling for feature extraction operations.
//!
//! This module defines the error type shared by the external query clients,
//! the resolution stages and the configuration layer. Errors never cross the
//! worker pool boundary; they are classified into outcomes long before that.

use std::fmt;
use std::time::Duration;

/// Main error type for the feature pipeline.
///
/// Each variant carries enough context for a single diagnostic log line.
/// Whether a failure is worth another attempt is decided by [`is_retryable`].
///
/// [`is_retryable`]: PipelineError::is_retryable
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// Candidate string has no usable host
    InvalidCandidate { candidate: String, reason: String },

    /// Resolver-level failure (network, SERVFAIL, refused, ...)
    DnsError {
        name: String,
        record_type: String,
        message: String,
    },

    /// The name resolved but has no records of the requested type
    NoRecords { name: String, record_type: String },

    /// WHOIS lookup failures
    WhoisError { domain: String, message: String },

    /// HTTP transport failures (connect, TLS, body decoding)
    HttpError { url: String, message: String },

    /// HTTP request completed with a non-success status
    HttpStatus { url: String, status: u16 },

    /// Unparseable payloads (dates, HTML, CSV cells)
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError { message: String },

    /// File I/O errors when reading inputs or writing the output table
    FileError { path: String, message: String },

    /// Timeout errors when operations take too long
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Rate limiting reported by a remote service
    RateLimited { service: String, message: String },

    /// A worker task failed or panicked
    TaskFailed { candidate: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl PipelineError {
    /// Create a new invalid candidate error.
    pub fn invalid_candidate<C: Into<String>, R: Into<String>>(candidate: C, reason: R) -> Self {
        Self::InvalidCandidate {
            candidate: candidate.into(),
            reason: reason.into(),
        }
    }

    /// Create a new DNS error.
    pub fn dns<N: Into<String>, T: Into<String>, M: Into<String>>(
        name: N,
        record_type: T,
        message: M,
    ) -> Self {
        Self::DnsError {
            name: name.into(),
            record_type: record_type.into(),
            message: message.into(),
        }
    }

    /// Create a new "no records" error.
    pub fn no_records<N: Into<String>, T: Into<String>>(name: N, record_type: T) -> Self {
        Self::NoRecords {
            name: name.into(),
            record_type: record_type.into(),
        }
    }

    /// Create a new WHOIS error.
    pub fn whois<D: Into<String>, M: Into<String>>(domain: D, message: M) -> Self {
        Self::WhoisError {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a new HTTP transport error.
    pub fn http<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::HttpError {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new HTTP status error.
    pub fn http_status<U: Into<String>>(url: U, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Create a new parse error.
    pub fn parse<M: Into<String>>(message: M) -> Self {
        Self::ParseError {
            message: message.into(),
            content: None,
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new rate limit error.
    pub fn rate_limited<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::RateLimited {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new task failure.
    pub fn task_failed<C: Into<String>, M: Into<String>>(candidate: C, message: M) -> Self {
        Self::TaskFailed {
            candidate: candidate.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error suggests the operation should be retried.
    ///
    /// Used by [`crate::QueryOutcome::classify`]. WHOIS lookups bypass this and
    /// treat every failure as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DnsError { .. }
                | Self::WhoisError { .. }
                | Self::HttpError { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::HttpStatus {
                    status: 429 | 500..=599,
                    ..
                }
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCandidate { candidate, reason } => {
                write!(f, "Invalid candidate '{}': {}", candidate, reason)
            }
            Self::DnsError {
                name,
                record_type,
                message,
            } => write!(f, "DNS {} lookup for '{}' failed: {}", record_type, name, message),
            Self::NoRecords { name, record_type } => {
                write!(f, "No {} records for '{}'", record_type, name)
            }
            Self::WhoisError { domain, message } => {
                write!(f, "WHOIS error for '{}': {}", domain, message)
            }
            Self::HttpError { url, message } => write!(f, "HTTP error for '{}': {}", url, message),
            Self::HttpStatus { url, status } => write!(f, "HTTP {} from '{}'", status, url),
            Self::ParseError { message, content: _ } => write!(f, "Parse error: {}", message),
            Self::ConfigError { message } => write!(f, "Configuration error: {}", message),
            Self::FileError { path, message } => write!(f, "File error at '{}': {}", path, message),
            Self::Timeout {
                operation,
                duration,
            } => write!(f, "Timeout after {:?} during: {}", duration, operation),
            Self::RateLimited { service, message } => {
                write!(f, "Rate limited by {}: {}", service, message)
            }
            Self::TaskFailed { candidate, message } => {
                write!(f, "Task for '{}' failed: {}", candidate, message)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            Self::timeout(format!("HTTP request {}", url), Duration::from_secs(0))
        } else if err.is_connect() {
            Self::http(url, format!("Connection failed: {}", err))
        } else {
            Self::http(url, err.to_string())
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        Self::ParseError {
            message: format!("CSV error: {}", err),
            content: None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}
