//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `PF_*`
//! environment variables, and applying both onto a [`PipelineConfig`].
//! Precedence (highest first): CLI arguments, environment, config files,
//! built-in defaults.

use crate::error::PipelineError;
use crate::types::{DedupKey, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loaded from TOML files.
///
/// Every section and every field is optional; missing values fall through
/// to the next layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// General defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Resolver settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,

    /// WHOIS retry settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois: Option<WhoisConfig>,

    /// Page, script and probe timeouts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Worker pool settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolConfig>,

    /// Input caps and deduplication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Maximum candidates in flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Page fetch timeout (as string, e.g., "8s", "500ms")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DnsConfig {
    /// Resolver IP addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WhoisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HttpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PoolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_min: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_max: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InputConfig {
    /// Cap on candidates read from the main input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Cap on the legitimate reference list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legit_limit: Option<usize>,

    /// `registrable` or `url`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup: Option<String>,
}

/// Field-wise merge where values from `higher` win.
trait Merge {
    fn merge(self, higher: Self) -> Self;
}

fn merge_section<T: Merge>(lower: Option<T>, higher: Option<T>) -> Option<T> {
    match (lower, higher) {
        (Some(lower), Some(higher)) => Some(lower.merge(higher)),
        (lower, higher) => higher.or(lower),
    }
}

impl Merge for DefaultsConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            concurrency: higher.concurrency.or(self.concurrency),
            timeout: higher.timeout.or(self.timeout),
        }
    }
}

impl Merge for DnsConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            nameservers: higher.nameservers.or(self.nameservers),
            timeout: higher.timeout.or(self.timeout),
            lifetime: higher.lifetime.or(self.lifetime),
        }
    }
}

impl Merge for WhoisConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            attempts: higher.attempts.or(self.attempts),
            backoff: higher.backoff.or(self.backoff),
            timeout: higher.timeout.or(self.timeout),
        }
    }
}

impl Merge for HttpConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            page_timeout: higher.page_timeout.or(self.page_timeout),
            script_timeout: higher.script_timeout.or(self.script_timeout),
            probe_timeout: higher.probe_timeout.or(self.probe_timeout),
        }
    }
}

impl Merge for PoolConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            jitter_min: higher.jitter_min.or(self.jitter_min),
            jitter_max: higher.jitter_max.or(self.jitter_max),
        }
    }
}

impl Merge for InputConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            limit: higher.limit.or(self.limit),
            legit_limit: higher.legit_limit.or(self.legit_limit),
            dedup: higher.dedup.or(self.dedup),
        }
    }
}

impl Merge for FileConfig {
    fn merge(self, higher: Self) -> Self {
        Self {
            defaults: merge_section(self.defaults, higher.defaults),
            dns: merge_section(self.dns, higher.dns),
            whois: merge_section(self.whois, higher.whois),
            http: merge_section(self.http, higher.http),
            pool: merge_section(self.pool, higher.pool),
            input: merge_section(self.input, higher.input),
        }
    }
}

impl FileConfig {
    /// Apply every value set in this file onto `config`.
    pub fn apply_to(&self, mut config: PipelineConfig) -> Result<PipelineConfig, PipelineError> {
        if let Some(defaults) = &self.defaults {
            if let Some(concurrency) = defaults.concurrency {
                config = config.with_concurrency(concurrency);
            }
            if let Some(timeout) = &defaults.timeout {
                config.page_timeout = require_duration("defaults.timeout", timeout)?;
            }
        }

        if let Some(dns) = &self.dns {
            if let Some(nameservers) = &dns.nameservers {
                config.dns_servers = parse_nameservers(nameservers)?;
            }
            if let Some(timeout) = &dns.timeout {
                config.dns_timeout = require_duration("dns.timeout", timeout)?;
            }
            if let Some(lifetime) = &dns.lifetime {
                config.dns_lifetime = require_duration("dns.lifetime", lifetime)?;
            }
        }

        if let Some(whois) = &self.whois {
            if let Some(attempts) = whois.attempts {
                config.whois_attempts = attempts.max(1);
            }
            if let Some(backoff) = &whois.backoff {
                config.whois_backoff = require_duration("whois.backoff", backoff)?;
            }
            if let Some(timeout) = &whois.timeout {
                config.whois_timeout = require_duration("whois.timeout", timeout)?;
            }
        }

        if let Some(http) = &self.http {
            if let Some(timeout) = &http.page_timeout {
                config.page_timeout = require_duration("http.page_timeout", timeout)?;
            }
            if let Some(timeout) = &http.script_timeout {
                config.script_timeout = require_duration("http.script_timeout", timeout)?;
            }
            if let Some(timeout) = &http.probe_timeout {
                config.probe_timeout = require_duration("http.probe_timeout", timeout)?;
            }
        }

        if let Some(pool) = &self.pool {
            let min = match &pool.jitter_min {
                Some(value) => require_duration("pool.jitter_min", value)?,
                None => config.jitter_min,
            };
            let max = match &pool.jitter_max {
                Some(value) => require_duration("pool.jitter_max", value)?,
                None => config.jitter_max,
            };
            config = config.with_jitter(min, max);
        }

        if let Some(input) = &self.input {
            if input.limit.is_some() {
                config.limit = input.limit;
            }
            if input.legit_limit.is_some() {
                config.legit_limit = input.legit_limit;
            }
            if let Some(dedup) = &input.dedup {
                config.dedup = dedup
                    .parse::<DedupKey>()
                    .map_err(PipelineError::config)?;
            }
        }

        Ok(config)
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to emit warnings for config issues
    pub verbose: bool,
}

impl ConfigManager {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load and validate configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, PipelineError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PipelineError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            PipelineError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG, global and local files are merged from lowest to highest
    /// precedence. A file that fails to load is skipped.
    pub fn discover_and_load(&self) -> Result<FileConfig, PipelineError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let discovered = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in discovered.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = merged_config.merge(config);
                    loaded_files.push(path);
                }
                Err(e) => {
                    if self.verbose {
                        eprintln!("⚠️  Skipping {}: {}", path.display(), e);
                    }
                }
            }
        }

        if self.verbose && loaded_files.len() > 1 {
            eprintln!("⚠️  Multiple config files found. Merged in order:");
            for path in &loaded_files {
                eprintln!("   {}", path.display());
            }
        }

        Ok(merged_config)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./phish-features.toml", "./.phish-features.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let candidates = [".phish-features.toml", "phish-features.toml"];

        candidates
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// `$XDG_CONFIG_HOME/phish-features/config.toml`, or under `~/.config`.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("phish-features").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), PipelineError> {
        if let Some(defaults) = &config.defaults {
            if let Some(concurrency) = defaults.concurrency {
                if concurrency == 0 || concurrency > 200 {
                    return Err(PipelineError::config(
                        "Concurrency must be between 1 and 200",
                    ));
                }
            }
            if let Some(timeout) = &defaults.timeout {
                require_duration("defaults.timeout", timeout)?;
            }
        }

        if let Some(dns) = &config.dns {
            if let Some(nameservers) = &dns.nameservers {
                parse_nameservers(nameservers)?;
            }
            for (field, value) in [("dns.timeout", &dns.timeout), ("dns.lifetime", &dns.lifetime)] {
                if let Some(value) = value {
                    require_duration(field, value)?;
                }
            }
        }

        if let Some(whois) = &config.whois {
            if whois.attempts == Some(0) {
                return Err(PipelineError::config("WHOIS attempts must be at least 1"));
            }
            for (field, value) in [
                ("whois.backoff", &whois.backoff),
                ("whois.timeout", &whois.timeout),
            ] {
                if let Some(value) = value {
                    require_duration(field, value)?;
                }
            }
        }

        if let Some(http) = &config.http {
            for (field, value) in [
                ("http.page_timeout", &http.page_timeout),
                ("http.script_timeout", &http.script_timeout),
                ("http.probe_timeout", &http.probe_timeout),
            ] {
                if let Some(value) = value {
                    require_duration(field, value)?;
                }
            }
        }

        if let Some(pool) = &config.pool {
            let min = pool
                .jitter_min
                .as_deref()
                .map(|v| require_duration("pool.jitter_min", v))
                .transpose()?;
            let max = pool
                .jitter_max
                .as_deref()
                .map(|v| require_duration("pool.jitter_max", v))
                .transpose()?;
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(PipelineError::config(
                        "pool.jitter_min must not exceed pool.jitter_max",
                    ));
                }
            }
        }

        if let Some(dedup) = config.input.as_ref().and_then(|i| i.dedup.as_ref()) {
            dedup.parse::<DedupKey>().map_err(PipelineError::config)?;
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via PF_* environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub dns_servers: Option<Vec<IpAddr>>,
    pub dns_timeout: Option<Duration>,
    pub dns_lifetime: Option<Duration>,
    pub whois_attempts: Option<u32>,
    pub whois_backoff: Option<Duration>,
    pub http_timeout: Option<Duration>,
    pub limit: Option<usize>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Apply every value set in the environment onto `config`.
    pub fn apply_to(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(servers) = &self.dns_servers {
            config = config.with_dns_servers(servers.clone());
        }
        if let Some(timeout) = self.dns_timeout {
            config.dns_timeout = timeout;
        }
        if let Some(lifetime) = self.dns_lifetime {
            config.dns_lifetime = lifetime;
        }
        if let Some(attempts) = self.whois_attempts {
            config.whois_attempts = attempts;
        }
        if let Some(backoff) = self.whois_backoff {
            config.whois_backoff = backoff;
        }
        if let Some(timeout) = self.http_timeout {
            config.page_timeout = timeout;
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        config
    }
}

/// Load configuration from environment variables.
///
/// Parses all PF_* environment variables. Invalid values are reported when
/// `verbose` is set and otherwise ignored.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    load_env_from(|key| env::var(key).ok(), verbose)
}

fn load_env_from<F>(lookup: F, verbose: bool) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    let report_invalid = |key: &str, value: &str, hint: &str| {
        if verbose {
            eprintln!("⚠️ Invalid {}='{}', {}", key, value, hint);
        }
    };
    let report_used = |key: &str, value: &str| {
        if verbose {
            eprintln!("🔧 Using {}={}", key, value);
        }
    };

    if let Some(val) = lookup("PF_CONCURRENCY") {
        match val.trim().parse::<usize>() {
            Ok(concurrency) if (1..=200).contains(&concurrency) => {
                env_config.concurrency = Some(concurrency);
                report_used("PF_CONCURRENCY", &val);
            }
            _ => report_invalid("PF_CONCURRENCY", &val, "must be 1-200"),
        }
    }

    if let Some(val) = lookup("PF_DNS_SERVERS") {
        let servers: Vec<String> = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        match parse_nameservers(&servers) {
            Ok(servers) if !servers.is_empty() => {
                env_config.dns_servers = Some(servers);
                report_used("PF_DNS_SERVERS", &val);
            }
            _ => report_invalid("PF_DNS_SERVERS", &val, "use comma-separated IP addresses"),
        }
    }

    let durations: [(&str, &mut Option<Duration>); 4] = [
        ("PF_DNS_TIMEOUT", &mut env_config.dns_timeout),
        ("PF_DNS_LIFETIME", &mut env_config.dns_lifetime),
        ("PF_WHOIS_BACKOFF", &mut env_config.whois_backoff),
        ("PF_HTTP_TIMEOUT", &mut env_config.http_timeout),
    ];
    for (key, slot) in durations {
        if let Some(val) = lookup(key) {
            match parse_duration_string(&val) {
                Some(duration) => {
                    *slot = Some(duration);
                    report_used(key, &val);
                }
                None => report_invalid(key, &val, "use format like '500ms', '5s', '2m'"),
            }
        }
    }

    if let Some(val) = lookup("PF_WHOIS_ATTEMPTS") {
        match val.trim().parse::<u32>() {
            Ok(attempts) if attempts > 0 => {
                env_config.whois_attempts = Some(attempts);
                report_used("PF_WHOIS_ATTEMPTS", &val);
            }
            _ => report_invalid("PF_WHOIS_ATTEMPTS", &val, "must be at least 1"),
        }
    }

    if let Some(val) = lookup("PF_LIMIT") {
        match val.trim().parse::<usize>() {
            Ok(limit) => {
                env_config.limit = Some(limit);
                report_used("PF_LIMIT", &val);
            }
            Err(_) => report_invalid("PF_LIMIT", &val, "must be a non-negative integer"),
        }
    }

    if let Some(config_path) = lookup("PF_CONFIG") {
        if !config_path.trim().is_empty() {
            report_used("PF_CONFIG", &config_path);
            env_config.config = Some(config_path);
        }
    }

    env_config
}

/// Parse a duration string like "500ms", "5s", "2m" (bare numbers are seconds).
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<f64>().ok().and_then(seconds)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60))
    } else {
        value.parse::<f64>().ok().and_then(seconds)
    }
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

fn require_duration(field: &str, value: &str) -> Result<Duration, PipelineError> {
    parse_duration_string(value).ok_or_else(|| {
        PipelineError::config(format!(
            "Invalid {} '{}'. Use format like '500ms', '5s', '2m'",
            field, value
        ))
    })
}

fn parse_nameservers(values: &[String]) -> Result<Vec<IpAddr>, PipelineError> {
    values
        .iter()
        .map(|value| {
            value.trim().parse::<IpAddr>().map_err(|_| {
                PipelineError::config(format!("Invalid nameserver address '{}'", value))
            })
        })
        .collect()
}
