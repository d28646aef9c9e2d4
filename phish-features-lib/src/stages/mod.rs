//! Per-candidate resolution stages.
//!
//! A stage turns one admitted candidate into an intermediate result (or a
//! drop) by walking a fallback chain of external queries. Row builders then
//! map intermediate results onto output rows.

pub mod dns;
pub mod scripts;

pub use dns::{dns_feature_row, DnsStage, DNS_FEATURE_NAMES};
pub use scripts::{script_feature_row, ScriptStage};
