//! # Phish Features Library
//!
//! Builds labeled feature datasets for phishing-detection models by probing
//! batches of domains and URLs against DNS resolvers, WHOIS and HTTP
//! servers, and summarizing pages and scripts into numeric feature rows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phish_features_lib::{Batch, CandidateSource, CsvSink, FeaturePipeline, Label, PipelineConfig};
//! use phish_features_lib::{identity_first, DNS_FEATURE_NAMES};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = FeaturePipeline::new(PipelineConfig::default());
//!     let candidates = CandidateSource::new("phishing.csv").read()?;
//!
//!     let mut sink = CsvSink::new(identity_first("domain", DNS_FEATURE_NAMES));
//!     let summary = pipeline
//!         .run_dns(pipeline.dns_stage(), Batch::new(candidates, Label::Phishing), &mut sink)
//!         .await;
//!     sink.write_file("dns_features.csv")?;
//!
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Deduplication**: at most one row per registrable domain (or exact URL) per run
//! - **Bounded Concurrency**: one worker pool with jitter shared by all pipelines
//! - **Fallback Chains**: `www.` alternates for DNS, scheme/host probing for pages
//! - **Retry Policy**: bounded WHOIS retries with a fixed or exponential backoff
//! - **Failure Isolation**: one candidate's failure never touches another's row

// Re-export main public API types and functions
pub use concurrent::{Jitter, Resolution, TaskOutcome, TaskReport, WorkerPool};
pub use config::{load_env_config, parse_duration_string, ConfigManager, EnvConfig, FileConfig};
pub use dedup::{Admission, Deduplicator};
pub use error::PipelineError;
pub use fallback::FallbackChain;
pub use features::{
    aggregate_max, html_page_features, FeatureExtractor, JsFeatureExtractor, PageDocument,
    HTML_FEATURE_NAMES, JS_FEATURE_NAMES,
};
pub use pipeline::{Batch, FeaturePipeline, PageDirectory, ProgressFn, RunSummary};
pub use protocols::{
    DnsAnswer, DnsClient, DnsRecord, HickoryDnsClient, HttpFetcher, HttpResponse, RecordType,
    ReqwestFetcher, WhoisClient, WhoisLookup,
};
pub use retry::{Backoff, QueryOutcome, RetryOn, RetryPolicy};
pub use select::{select_columns, select_columns_file};
pub use sink::{identity_first, identity_last, Column, CsvSink};
pub use source::{CandidateSource, ColumnSelector};
pub use stages::{
    dns_feature_row, script_feature_row, DnsStage, ScriptStage, DNS_FEATURE_NAMES,
};
pub use types::{
    Candidate, DedupKey, DnsIntermediate, FeatureRow, FeatureVector, Label, PipelineConfig,
    RecordSet, ScriptIntermediate, WhoisResult,
};
pub use utils::canonical_identity;

// Public modules
pub mod features;

// Internal modules - reachable through the re-exports above
mod concurrent;
mod config;
mod dedup;
mod error;
mod fallback;
mod pipeline;
mod protocols;
mod retry;
mod select;
mod sink;
mod source;
mod stages;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, PipelineError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Get library information for debugging or display purposes.
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        author: AUTHOR,
        pipelines: vec!["dns", "scripts", "html"],
    }
}

/// Information about the library build
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub version: &'static str,
    pub author: &'static str,
    pub pipelines: Vec<&'static str>,
}
