//! Phish Features CLI Application
//!
//! Command-line interface over phish-features-lib. Builds labeled DNS,
//! script and HTML feature tables for phishing-detection datasets, and
//! trims existing tables down to selected columns.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};
use phish_features_lib::{
    identity_first, identity_last, load_env_config, select_columns_file, Batch, CandidateSource,
    ColumnSelector, ConfigManager, CsvSink, DedupKey, FeaturePipeline, Label, PageDirectory,
    PipelineConfig, RunSummary, DNS_FEATURE_NAMES, HTML_FEATURE_NAMES,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for phish-features
#[derive(Parser, Debug)]
#[command(name = "phish-features")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build labeled DNS, WHOIS and script feature datasets for phishing detection")]
#[command(
    long_about = "Build labeled feature datasets for phishing-detection models.\n\nProbes domains and URLs against DNS resolvers, WHOIS and web servers under a concurrency cap, and writes one CSV row per distinct candidate."
)]
#[command(styles = STYLES)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Max candidates in flight (default: 20, max: 200)
    #[arg(
        short = 'c',
        long = "concurrency",
        global = true,
        help_heading = "Performance"
    )]
    pub concurrency: Option<usize>,

    /// Use specific config file instead of automatic discovery
    #[arg(
        long = "config",
        value_name = "FILE",
        global = true,
        help_heading = "Configuration"
    )]
    pub config: Option<String>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", global = true, help_heading = "Configuration")]
    pub verbose: bool,

    /// Show detailed debug information
    #[arg(short = 'd', long = "debug", global = true, help_heading = "Configuration")]
    pub debug: bool,

    /// No progress or summary output
    #[arg(short = 'q', long = "quiet", global = true, help_heading = "Configuration")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// DNS and WHOIS features for one labeled list of domains
    Dns(DnsArgs),
    /// JavaScript features for phishing URLs and legitimate domains
    Scripts(ScriptsArgs),
    /// Page-structure features for saved HTML files
    Html(HtmlArgs),
    /// Keep only the given columns of a feature table
    Select(SelectArgs),
}

#[derive(Args, Debug)]
pub struct DnsArgs {
    /// Input table (CSV) or list (.txt/.list) of domains
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Label written to every row (0 = legitimate, 1 = phishing)
    #[arg(short = 'l', long = "label", value_parser = parse_label)]
    pub label: Label,

    /// Output CSV file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Input column: header name or zero-based index
    #[arg(long = "column", value_name = "COLUMN")]
    pub column: Option<ColumnSelector>,

    /// The input CSV has no header row
    #[arg(long = "no-header")]
    pub no_header: bool,

    /// Only process the first N entries
    #[arg(long = "limit", value_name = "N")]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ScriptsArgs {
    /// Output CSV file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Phishing URLs, fetched as-is (label 1)
    #[arg(long = "phish", value_name = "FILE")]
    pub phish: Option<PathBuf>,

    /// Legitimate domains, resolved to a live page first (label 0)
    #[arg(long = "legit", value_name = "FILE")]
    pub legit: Option<PathBuf>,

    /// Column of the phishing table
    #[arg(long = "phish-column", value_name = "COLUMN")]
    pub phish_column: Option<ColumnSelector>,

    /// Column of the legitimate table
    #[arg(long = "legit-column", value_name = "COLUMN")]
    pub legit_column: Option<ColumnSelector>,

    /// The input CSVs have no header row
    #[arg(long = "no-header")]
    pub no_header: bool,

    /// Only process the first N phishing entries
    #[arg(long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Cap on distinct legitimate domains (default: 70001)
    #[arg(long = "legit-limit", value_name = "N")]
    pub legit_limit: Option<usize>,

    /// Deduplication identity: registrable or url
    #[arg(long = "dedup", value_name = "KEY")]
    pub dedup: Option<DedupKey>,
}

#[derive(Args, Debug)]
pub struct HtmlArgs {
    /// Directory of saved phishing pages (label 1)
    #[arg(long = "phish-dir", value_name = "DIR")]
    pub phish_dir: PathBuf,

    /// Directory of saved legitimate pages (label 0)
    #[arg(long = "legit-dir", value_name = "DIR")]
    pub legit_dir: PathBuf,

    /// Output CSV file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Input feature table
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Output CSV file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Columns to keep, in output order (comma-separated)
    #[arg(long = "features", value_name = "COLUMNS", value_delimiter = ',', required = true)]
    pub features: Vec<String>,
}

fn parse_label(value: &str) -> Result<Label, String> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(Label::from_value)
        .ok_or_else(|| format!("invalid label '{}', expected 0 or 1", value))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Dns(args) => run_dns(&cli, args).await,
        Command::Scripts(args) => run_scripts(&cli, args).await,
        Command::Html(args) => run_html(&cli, args),
        Command::Select(args) => {
            let rows = select_columns_file(&args.input, &args.output, &args.features)?;
            if !cli.quiet {
                eprintln!(
                    "Selected {} column{} over {} row{} into {}",
                    args.features.len(),
                    if args.features.len() == 1 { "" } else { "s" },
                    rows,
                    if rows == 1 { "" } else { "s" },
                    args.output.display()
                );
            }
            Ok(())
        }
    }
}

async fn run_dns(cli: &Cli, args: &DnsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = build_config(cli)?;
    if args.limit.is_some() {
        config.limit = args.limit;
    }

    let candidates = CandidateSource::new(&args.input)
        .with_column(args.column.clone().unwrap_or_default())
        .with_header(!args.no_header)
        .with_limit(config.limit)
        .read()?;

    let pipeline = build_pipeline(cli, config);
    let started = Instant::now();
    if !cli.quiet {
        ui::print_header("dns", candidates.len(), pipeline.config().concurrency);
    }

    let mut sink = CsvSink::new(identity_first("domain", DNS_FEATURE_NAMES));
    let summary = pipeline
        .run_dns(
            pipeline.dns_stage(),
            Batch::new(candidates, args.label),
            &mut sink,
        )
        .await;

    finish(cli, &sink, &summary, &args.output, started)
}

async fn run_scripts(cli: &Cli, args: &ScriptsArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.phish.is_none() && args.legit.is_none() {
        return Err("at least one of --phish or --legit is required".into());
    }

    let mut config = build_config(cli)?;
    if args.limit.is_some() {
        config.limit = args.limit;
    }
    if args.legit_limit.is_some() {
        config.legit_limit = args.legit_limit;
    }
    if let Some(dedup) = args.dedup {
        config.dedup = dedup;
    }

    let mut batches = Vec::new();
    if let Some(path) = &args.phish {
        let candidates = CandidateSource::new(path)
            .with_column(args.phish_column.clone().unwrap_or_default())
            .with_header(!args.no_header)
            .with_limit(config.limit)
            .read()?;
        batches.push(Batch::new(candidates, Label::Phishing));
    }
    if let Some(path) = &args.legit {
        let candidates = CandidateSource::new(path)
            .with_column(args.legit_column.clone().unwrap_or_default())
            .with_header(!args.no_header)
            .with_exact_dedup(true)
            .with_limit(config.legit_limit)
            .read()?;
        batches.push(Batch::new(candidates, Label::Legitimate).with_legal_resolution());
    }

    let total: usize = batches.iter().map(|batch| batch.candidates.len()).sum();
    let pipeline = build_pipeline(cli, config);
    let stage = pipeline.script_stage()?;
    let started = Instant::now();
    if !cli.quiet {
        ui::print_header("scripts", total, pipeline.config().concurrency);
    }

    let mut sink = CsvSink::new(identity_last("url", &stage.extractor().feature_names()));
    let summary = pipeline.run_scripts(stage, batches, &mut sink).await;

    finish(cli, &sink, &summary, &args.output, started)
}

fn run_html(cli: &Cli, args: &HtmlArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(cli)?;
    let pipeline = build_pipeline(cli, config);
    let started = Instant::now();

    let directories = [
        PageDirectory {
            path: args.phish_dir.clone(),
            label: Label::Phishing,
        },
        PageDirectory {
            path: args.legit_dir.clone(),
            label: Label::Legitimate,
        },
    ];

    let mut sink = CsvSink::new(identity_first("file", HTML_FEATURE_NAMES));
    let summary = pipeline.run_html(&directories, &mut sink)?;

    finish(cli, &sink, &summary, &args.output, started)
}

fn finish(
    cli: &Cli,
    sink: &CsvSink,
    summary: &RunSummary,
    output: &Path,
    started: Instant,
) -> Result<(), Box<dyn std::error::Error>> {
    sink.write_file(output)?;
    info!("run finished: {}", summary);

    if !cli.quiet {
        ui::print_summary(summary, output, started.elapsed());
    }
    Ok(())
}

fn build_pipeline(cli: &Cli, config: PipelineConfig) -> FeaturePipeline {
    let pipeline = FeaturePipeline::new(config);
    if cli.quiet {
        pipeline
    } else {
        let progress = ui::Progress::new();
        pipeline.with_progress(move |finished, total| progress.update(finished, total))
    }
}

/// Layer config files, `PF_*` environment variables and CLI flags onto the
/// defaults, lowest precedence first.
fn build_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::default();
    let config_manager = ConfigManager::new(cli.verbose);
    let env_config = load_env_config(cli.verbose);

    // Step 1: config files (explicit path or discovery)
    let explicit_path = cli.config.clone().or_else(|| env_config.config.clone());
    if let Some(path) = explicit_path {
        if cli.verbose {
            eprintln!("🔧 Using explicit config file: {}", path);
        }
        let file_config = config_manager
            .load_file(&path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?;
        config = file_config.apply_to(config)?;
    } else {
        match config_manager.discover_and_load() {
            Ok(file_config) => config = file_config.apply_to(config)?,
            Err(e) if cli.verbose => eprintln!("⚠️ Config discovery warning: {}", e),
            Err(_) => {}
        }
    }

    // Step 2: environment variables (PF_*)
    config = env_config.apply_to(config);

    // Step 3: CLI arguments (highest precedence)
    if let Some(concurrency) = cli.concurrency {
        if concurrency == 0 || concurrency > 200 {
            return Err("Concurrency must be between 1 and 200".into());
        }
        config = config.with_concurrency(concurrency);
    }

    Ok(config)
}
