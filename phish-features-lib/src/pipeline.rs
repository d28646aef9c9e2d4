//! Pipeline coordinator.
//!
//! The coordinator admits candidates through the [`Deduplicator`] in input
//! order, dispatches the admitted ones to the [`WorkerPool`] and feeds
//! finished rows into the [`CsvSink`]. Candidate failures end up in the
//! [`RunSummary`]; only input and output errors are returned to the caller.

use crate::concurrent::{Jitter, Resolution, TaskOutcome, WorkerPool};
use crate::dedup::{Admission, Deduplicator};
use crate::error::PipelineError;
use crate::features::{html_page_features, JsFeatureExtractor, PageDocument};
use crate::protocols::{HickoryDnsClient, ReqwestFetcher, WhoisClient};
use crate::retry::{Backoff, RetryOn, RetryPolicy};
use crate::sink::CsvSink;
use crate::stages::{dns_feature_row, script_feature_row, DnsStage, ScriptStage};
use crate::types::{Candidate, DedupKey, FeatureRow, Label, PipelineConfig};
use futures::StreamExt;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates sharing one label.
#[derive(Debug, Clone)]
pub struct Batch {
    pub candidates: Vec<Candidate>,
    pub label: Label,
    /// Resolve bare domains to a live page before fetching scripts
    pub resolve_legal: bool,
}

impl Batch {
    pub fn new(candidates: Vec<Candidate>, label: Label) -> Self {
        Self {
            candidates,
            label,
            resolve_legal: false,
        }
    }

    pub fn with_legal_resolution(mut self) -> Self {
        self.resolve_legal = true;
        self
    }
}

/// A directory of saved HTML pages sharing one label.
#[derive(Debug, Clone)]
pub struct PageDirectory {
    pub path: PathBuf,
    pub label: Label,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: usize,
    pub emitted: usize,
    pub duplicate: usize,
    pub invalid: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn merge(&mut self, other: RunSummary) {
        self.submitted += other.submitted;
        self.emitted += other.emitted;
        self.duplicate += other.duplicate;
        self.invalid += other.invalid;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }

    /// Candidates that were admitted and dispatched.
    pub fn dispatched(&self) -> usize {
        self.submitted - self.duplicate - self.invalid
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted {}, emitted {}, duplicate {}, invalid {}, dropped {}, failed {}",
            self.submitted, self.emitted, self.duplicate, self.invalid, self.dropped, self.failed
        )
    }
}

/// Progress callback: `(finished, total)` for the batch in flight.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Drives batches through a resolution stage into a sink.
#[derive(Clone)]
pub struct FeaturePipeline {
    config: PipelineConfig,
    pool: WorkerPool,
    progress: Option<ProgressFn>,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let pool = WorkerPool::new(config.concurrency)
            .with_jitter(Jitter::new(config.jitter_min, config.jitter_max));
        Self {
            config,
            pool,
            progress: None,
        }
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// DNS stage backed by the hickory resolver and the system `whois` command.
    pub fn dns_stage(&self) -> DnsStage {
        let policy = RetryPolicy::new(
            self.config.whois_attempts,
            Backoff::Fixed(self.config.whois_backoff),
        )
        .retry_on(RetryOn::AnyError);

        DnsStage::new(
            Arc::new(HickoryDnsClient::from_config(&self.config)),
            Arc::new(WhoisClient::with_timeout(self.config.whois_timeout)),
        )
        .with_whois_policy(policy)
    }

    /// Script stage backed by reqwest and the JavaScript extractor.
    pub fn script_stage(&self) -> Result<ScriptStage, PipelineError> {
        Ok(ScriptStage::new(
            Arc::new(ReqwestFetcher::new()?),
            Arc::new(JsFeatureExtractor::new()),
        )
        .with_timeouts(
            self.config.page_timeout,
            self.config.script_timeout,
            self.config.probe_timeout,
        ))
    }

    /// Run one batch through the DNS stage.
    ///
    /// DNS rows are keyed by registrable domain, so this run always
    /// deduplicates on it regardless of the configured key.
    pub async fn run_dns(&self, stage: DnsStage, batch: Batch, sink: &mut CsvSink) -> RunSummary {
        let dedup = Deduplicator::new(DedupKey::Registrable);
        let label = batch.label;
        let stage = Arc::new(stage);

        let worker = Arc::new(move |candidate: Candidate| {
            let stage = Arc::clone(&stage);
            async move {
                let resolution = stage.resolve(&candidate).await?;
                Ok::<_, PipelineError>(
                    resolution.map(|intermediate| dns_feature_row(&intermediate, label)),
                )
            }
        });

        self.dispatch(&dedup, batch, worker, sink).await
    }

    /// Run batches through the script stage into one table.
    ///
    /// All batches share one deduplicator, so a domain listed as both
    /// phishing and legitimate is emitted once, under the first batch.
    pub async fn run_scripts(
        &self,
        stage: ScriptStage,
        batches: Vec<Batch>,
        sink: &mut CsvSink,
    ) -> RunSummary {
        let dedup = Deduplicator::new(self.config.dedup);
        let stage = Arc::new(stage);
        let mut summary = RunSummary::default();

        for batch in batches {
            let label = batch.label;
            let resolve_legal = batch.resolve_legal;
            let stage = Arc::clone(&stage);

            let worker = Arc::new(move |candidate: Candidate| {
                let stage = Arc::clone(&stage);
                async move {
                    let resolution = stage.resolve(&candidate, resolve_legal).await?;
                    Ok::<_, PipelineError>(resolution.and_then(|intermediate| {
                        script_feature_row(&intermediate, label)
                    }))
                }
            });

            summary.merge(self.dispatch(&dedup, batch, worker, sink).await);
        }

        summary
    }

    /// Compute page-structure rows for every file of the given directories.
    ///
    /// Files are read in name order. A file that cannot be read is logged
    /// and counted as failed.
    pub fn run_html(
        &self,
        directories: &[PageDirectory],
        sink: &mut CsvSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        for directory in directories {
            let dir_name = directory.path.to_string_lossy().to_string();
            let mut paths: Vec<PathBuf> = fs::read_dir(&directory.path)
                .map_err(|e| PipelineError::file_error(&dir_name, e.to_string()))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file())
                .collect();
            paths.sort();

            info!("{}: {} pages labelled {}", dir_name, paths.len(), directory.label);
            let total = paths.len();

            for (done, path) in paths.into_iter().enumerate() {
                summary.submitted += 1;
                match fs::read(&path) {
                    Ok(bytes) => {
                        let page = PageDocument::parse(&String::from_utf8_lossy(&bytes));
                        let file_name = path
                            .file_name()
                            .map(|name| name.to_string_lossy().to_string())
                            .unwrap_or_default();
                        sink.push(FeatureRow {
                            identity: file_name,
                            features: html_page_features(&page),
                            label: directory.label,
                        });
                        summary.emitted += 1;
                    }
                    Err(e) => {
                        warn!("skipping {}: {}", path.display(), e);
                        summary.failed += 1;
                    }
                }
                self.report_progress(done + 1, total);
            }
        }

        Ok(summary)
    }

    async fn dispatch<F, Fut>(
        &self,
        dedup: &Deduplicator,
        batch: Batch,
        worker: Arc<F>,
        sink: &mut CsvSink,
    ) -> RunSummary
    where
        F: Fn(Candidate) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Resolution<FeatureRow>, PipelineError>>
            + Send
            + 'static,
    {
        let mut summary = RunSummary {
            submitted: batch.candidates.len(),
            ..RunSummary::default()
        };

        let mut admitted = Vec::with_capacity(batch.candidates.len());
        for candidate in batch.candidates {
            match dedup.admit(&candidate) {
                Admission::Admitted => admitted.push(candidate),
                Admission::Duplicate => summary.duplicate += 1,
                Admission::Invalid => {
                    debug!("invalid candidate '{}'", candidate.raw);
                    summary.invalid += 1;
                }
            }
        }

        let total = admitted.len();
        info!(
            "dispatching {} {} candidates ({} duplicate, {} invalid)",
            total, batch.label, summary.duplicate, summary.invalid
        );

        let mut reports = self.pool.run(admitted, worker);
        let mut finished = 0;
        while let Some(report) = reports.next().await {
            match report.outcome {
                TaskOutcome::Completed(row) => {
                    sink.push(row);
                    summary.emitted += 1;
                }
                TaskOutcome::Dropped => summary.dropped += 1,
                TaskOutcome::Failed(_) => summary.failed += 1,
            }
            finished += 1;
            self.report_progress(finished, total);
        }

        info!("{} batch finished: {}", batch.label, summary);
        summary
    }

    fn report_progress(&self, finished: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(finished, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_merge_and_display() {
        let mut summary = RunSummary {
            submitted: 5,
            emitted: 2,
            duplicate: 1,
            invalid: 1,
            dropped: 1,
            failed: 0,
        };
        summary.merge(RunSummary {
            submitted: 2,
            emitted: 1,
            failed: 1,
            ..RunSummary::default()
        });

        assert_eq!(summary.submitted, 7);
        assert_eq!(summary.dispatched(), 5);
        assert_eq!(
            summary.to_string(),
            "submitted 7, emitted 3, duplicate 1, invalid 1, dropped 1, failed 1"
        );
    }

    #[test]
    fn test_batch_builder() {
        let batch = Batch::new(vec![Candidate::new("example.com")], Label::Legitimate)
            .with_legal_resolution();
        assert!(batch.resolve_legal);
        assert_eq!(batch.candidates.len(), 1);
    }
}
