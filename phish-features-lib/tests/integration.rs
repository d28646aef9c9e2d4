// phish-features-lib/tests/integration.rs

//! Integration tests for the pipelines, driven by in-process clients (no network).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use phish_features_lib::{
    identity_first, identity_last, Batch, Candidate, CsvSink, DedupKey, DnsAnswer, DnsClient,
    DnsRecord, DnsStage, FeatureExtractor, FeaturePipeline, HttpFetcher, HttpResponse,
    JsFeatureExtractor, Label, PageDirectory, PipelineConfig, PipelineError, RecordType,
    ScriptStage, WhoisLookup, DNS_FEATURE_NAMES, HTML_FEATURE_NAMES,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Doubles ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockDns {
    answers: HashMap<(String, RecordType), DnsAnswer>,
    failing: HashMap<(String, RecordType), PipelineError>,
    panicking: Vec<String>,
    queried: Mutex<Vec<(String, RecordType)>>,
}

impl MockDns {
    fn records(mut self, name: &str, record_type: RecordType, ttls: &[u32]) -> Self {
        let records = ttls
            .iter()
            .map(|&ttl| DnsRecord { record_type, ttl })
            .collect();
        self.answers
            .insert((name.to_string(), record_type), DnsAnswer::new(records));
        self
    }

    fn failing(mut self, name: &str, record_type: RecordType) -> Self {
        self.failing.insert(
            (name.to_string(), record_type),
            PipelineError::dns(name, record_type.as_str(), "SERVFAIL"),
        );
        self
    }

    fn panicking(mut self, name: &str) -> Self {
        self.panicking.push(name.to_string());
        self
    }

    fn queried_names(&self, record_type: RecordType) -> Vec<String> {
        self.queried
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| *t == record_type)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl DnsClient for MockDns {
    async fn resolve(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<DnsAnswer, PipelineError> {
        if self.panicking.iter().any(|n| n == name) {
            panic!("resolver crashed on {}", name);
        }
        self.queried
            .lock()
            .unwrap()
            .push((name.to_string(), record_type));

        let key = (name.to_string(), record_type);
        if let Some(err) = self.failing.get(&key) {
            return Err(err.clone());
        }
        self.answers
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::no_records(name, record_type.as_str()))
    }
}

struct MockWhois {
    expirations: Option<Vec<DateTime<Utc>>>,
    calls: AtomicUsize,
}

impl MockWhois {
    fn expiring(dates: Vec<DateTime<Utc>>) -> Self {
        Self {
            expirations: Some(dates),
            calls: AtomicUsize::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            expirations: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WhoisLookup for MockWhois {
    async fn lookup(&self, domain: &str) -> Result<Vec<DateTime<Utc>>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.expirations
            .clone()
            .ok_or_else(|| PipelineError::whois(domain, "connection reset"))
    }
}

#[derive(Default)]
struct MockHttp {
    pages: HashMap<String, (u16, String)>,
}

impl MockHttp {
    fn page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), (status, body.to_string()));
        self
    }
}

#[async_trait]
impl HttpFetcher for MockHttp {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, PipelineError> {
        match self.pages.get(url) {
            Some((status, body)) => Ok(HttpResponse {
                status: *status,
                url: url.to_string(),
                body: body.clone(),
            }),
            None => Err(PipelineError::http(url, "connection refused")),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn pipeline() -> FeaturePipeline {
    FeaturePipeline::new(
        PipelineConfig::default()
            .with_concurrency(4)
            .with_jitter(Duration::ZERO, Duration::ZERO),
    )
}

fn candidates(raw: &[&str]) -> Vec<Candidate> {
    raw.iter().map(|r| Candidate::new(*r)).collect()
}

fn dns_sink() -> CsvSink {
    CsvSink::new(identity_first("domain", DNS_FEATURE_NAMES))
}

fn row_for<'a>(sink: &'a CsvSink, identity: &str) -> &'a phish_features_lib::FeatureRow {
    sink.rows()
        .iter()
        .find(|row| row.identity == identity)
        .unwrap_or_else(|| panic!("no row for {}", identity))
}

// ── DNS pipeline ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_dns_row_for_resolving_domain() {
    let dns = MockDns::default()
        .records("example.com", RecordType::A, &[300, 600])
        .records("example.com", RecordType::MX, &[3600])
        .records("example.com", RecordType::NS, &[86400, 86400])
        .records("example.com", RecordType::AAAA, &[300]);
    let whois = Arc::new(MockWhois::unreachable());
    let stage = DnsStage::new(Arc::new(dns), whois.clone());

    let mut sink = dns_sink();
    let summary = pipeline()
        .run_dns(stage, Batch::new(candidates(&["example.com"]), Label::Legitimate), &mut sink)
        .await;

    assert_eq!(summary.emitted, 1);
    let row = row_for(&sink, "example.com");
    assert_eq!(row.features.get("A_record_count"), Some(2.0));
    assert_eq!(row.features.get("has_multiple_A_records"), Some(1.0));
    assert_eq!(row.features.get("ttl_avg"), Some(450.0));
    assert_eq!(row.features.get("MX_count"), Some(1.0));
    assert_eq!(row.features.get("NS_count"), Some(2.0));
    assert_eq!(row.features.get("has_AAAA"), Some(1.0));
    assert_eq!(row.features.get("CNAME_count"), Some(0.0));

    // WHOIS exhausted all five attempts and degraded to the sentinel
    assert_eq!(whois.calls.load(Ordering::SeqCst), 5);
    assert_eq!(row.features.get("whois_days_to_expire"), Some(-1.0));
    assert_eq!(row.features.get("whois_success"), Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_domain_is_dropped() {
    let dns = Arc::new(MockDns::default());
    let stage = DnsStage::new(dns.clone(), Arc::new(MockWhois::unreachable()));

    let mut sink = dns_sink();
    let summary = pipeline()
        .run_dns(
            stage,
            Batch::new(candidates(&["nonexistent.invalid"]), Label::Phishing),
            &mut sink,
        )
        .await;

    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.emitted, 0);
    assert!(sink.is_empty());
    assert_eq!(
        dns.queried_names(RecordType::A),
        vec!["nonexistent.invalid", "www.nonexistent.invalid"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_www_fallback_drives_secondary_queries() {
    let dns = Arc::new(
        MockDns::default()
            .records("www.fallback.example", RecordType::A, &[120])
            .records("www.fallback.example", RecordType::TXT, &[60, 60]),
    );
    let stage = DnsStage::new(dns.clone(), Arc::new(MockWhois::unreachable()));

    let mut sink = dns_sink();
    pipeline()
        .run_dns(
            stage,
            Batch::new(candidates(&["fallback.example"]), Label::Phishing),
            &mut sink,
        )
        .await;

    let row = row_for(&sink, "fallback.example");
    assert_eq!(row.features.get("A_record_count"), Some(1.0));
    assert_eq!(row.features.get("TXT_count"), Some(2.0));
    assert_eq!(dns.queried_names(RecordType::MX), vec!["www.fallback.example"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_record_type_does_not_affect_siblings() {
    let dns = MockDns::default()
        .records("isolated.example", RecordType::A, &[300])
        .failing("isolated.example", RecordType::MX)
        .records("isolated.example", RecordType::NS, &[3600, 3600]);
    let stage = DnsStage::new(Arc::new(dns), Arc::new(MockWhois::unreachable()));

    let mut sink = dns_sink();
    pipeline()
        .run_dns(
            stage,
            Batch::new(candidates(&["isolated.example"]), Label::Phishing),
            &mut sink,
        )
        .await;

    let row = row_for(&sink, "isolated.example");
    assert_eq!(row.features.get("MX_count"), Some(0.0));
    assert_eq!(row.features.get("NS_count"), Some(2.0));
}

#[tokio::test(start_paused = true)]
async fn test_whois_earliest_expiration_wins() {
    let now = Utc::now();
    let whois = MockWhois::expiring(vec![
        now + ChronoDuration::days(400),
        now + ChronoDuration::days(30) + ChronoDuration::hours(1),
    ]);
    let dns = MockDns::default().records("dated.example", RecordType::A, &[300]);
    let stage = DnsStage::new(Arc::new(dns), Arc::new(whois));

    let mut sink = dns_sink();
    pipeline()
        .run_dns(
            stage,
            Batch::new(candidates(&["dated.example"]), Label::Legitimate),
            &mut sink,
        )
        .await;

    let row = row_for(&sink, "dated.example");
    assert_eq!(row.features.get("whois_days_to_expire"), Some(30.0));
    assert_eq!(row.features.get("whois_success"), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn test_subdomains_collapse_to_one_row() {
    let dns = MockDns::default().records("example.com", RecordType::A, &[300]);
    let stage = DnsStage::new(Arc::new(dns), Arc::new(MockWhois::unreachable()));

    let mut sink = dns_sink();
    let summary = pipeline()
        .run_dns(
            stage,
            Batch::new(
                candidates(&["http://a.example.com", "https://example.com", ""]),
                Label::Phishing,
            ),
            &mut sink,
        )
        .await;

    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.emitted, 1);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(summary.invalid, 1);
    assert_eq!(sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dns_run_ignores_url_dedup_key() {
    let dns = MockDns::default().records("example.com", RecordType::A, &[300]);
    let stage = DnsStage::new(Arc::new(dns), Arc::new(MockWhois::unreachable()));
    let pipeline = FeaturePipeline::new(
        PipelineConfig::default()
            .with_dedup(DedupKey::Url)
            .with_jitter(Duration::ZERO, Duration::ZERO),
    );

    let mut sink = dns_sink();
    let summary = pipeline
        .run_dns(
            stage,
            Batch::new(
                candidates(&["http://a.example.com/x", "https://example.com/y"]),
                Label::Phishing,
            ),
            &mut sink,
        )
        .await;

    assert_eq!(summary.emitted, 1);
    assert_eq!(summary.duplicate, 1);
    let identities: Vec<&str> = sink.rows().iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(identities, vec!["example.com"]);
}

#[tokio::test(start_paused = true)]
async fn test_www_prefixed_domain_still_tries_alternate() {
    let dns = Arc::new(MockDns::default().records("www.www.example", RecordType::A, &[60]));
    let stage = DnsStage::new(dns.clone(), Arc::new(MockWhois::unreachable()));

    let mut sink = dns_sink();
    let summary = pipeline()
        .run_dns(
            stage,
            Batch::new(candidates(&["www.example"]), Label::Phishing),
            &mut sink,
        )
        .await;

    assert_eq!(summary.emitted, 1);
    assert_eq!(
        dns.queried_names(RecordType::A),
        vec!["www.example", "www.www.example"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_task_is_contained() {
    let dns = MockDns::default()
        .records("site1.example", RecordType::A, &[60])
        .records("site2.example", RecordType::A, &[60])
        .panicking("site3.example")
        .records("site4.example", RecordType::A, &[60])
        .records("site5.example", RecordType::A, &[60]);
    let stage = DnsStage::new(Arc::new(dns), Arc::new(MockWhois::unreachable()));

    let mut sink = dns_sink();
    let summary = pipeline()
        .run_dns(
            stage,
            Batch::new(
                candidates(&[
                    "site1.example",
                    "site2.example",
                    "site3.example",
                    "site4.example",
                    "site5.example",
                ]),
                Label::Phishing,
            ),
            &mut sink,
        )
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.emitted, 4);

    let mut emitted: Vec<&str> = sink.rows().iter().map(|r| r.identity.as_str()).collect();
    emitted.sort();
    assert_eq!(
        emitted,
        vec!["site1.example", "site2.example", "site4.example", "site5.example"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_progress_reports_every_task() {
    let dns = MockDns::default().records("a.example", RecordType::A, &[1]);
    let stage = DnsStage::new(Arc::new(dns), Arc::new(MockWhois::unreachable()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let pipeline = pipeline().with_progress(move |finished, total| {
        recorder.lock().unwrap().push((finished, total));
    });

    let mut sink = dns_sink();
    pipeline
        .run_dns(
            stage,
            Batch::new(candidates(&["a.example", "b.example"]), Label::Phishing),
            &mut sink,
        )
        .await;

    assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_run_writes_header_only() {
    let stage = DnsStage::new(
        Arc::new(MockDns::default()),
        Arc::new(MockWhois::unreachable()),
    );

    let mut sink = dns_sink();
    let summary = pipeline()
        .run_dns(stage, Batch::new(Vec::new(), Label::Phishing), &mut sink)
        .await;
    assert_eq!(summary.submitted, 0);

    let mut buffer = Vec::new();
    sink.write_to(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("domain,domain_length,"));
    assert!(text.trim_end().ends_with("whois_success,label"));
}

// ── Script pipeline ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_script_pipeline_shares_dedup_across_batches() {
    let phish_page = r#"<html><head>
        <script>var a = 1;</script>
        <script>eval(x); eval(y); eval(z);</script>
        <script src="/js/loader.js"></script>
    </head></html>"#;
    let http = MockHttp::default()
        .page("http://login.example.com/verify", 200, phish_page)
        .page("http://login.example.com/js/loader.js", 200, "eval(w)")
        .page("https://example.org", 200, "<script>document.write('hi')</script>");

    let extractor = JsFeatureExtractor::new();
    let mut sink = CsvSink::new(identity_last("url", &extractor.feature_names()));
    let stage = ScriptStage::new(Arc::new(http), Arc::new(extractor));

    let batches = vec![
        Batch::new(
            candidates(&["http://login.example.com/verify"]),
            Label::Phishing,
        ),
        Batch::new(candidates(&["example.com", "example.org"]), Label::Legitimate)
            .with_legal_resolution(),
    ];

    let summary = pipeline().run_scripts(stage, batches, &mut sink).await;

    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(summary.emitted, 2);

    let phish = row_for(&sink, "http://login.example.com/verify");
    assert_eq!(phish.label, Label::Phishing);
    // max over [0, 3, 1]
    assert_eq!(phish.features.get("eval_count"), Some(3.0));

    let legit = row_for(&sink, "https://example.org");
    assert_eq!(legit.label, Label::Legitimate);
    assert_eq!(legit.features.get("document_write"), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn test_legitimate_domain_without_live_page_is_dropped() {
    let http = MockHttp::default().page("https://down.example", 503, "<script>x()</script>");
    let stage = ScriptStage::new(Arc::new(http), Arc::new(JsFeatureExtractor::new()));

    let mut sink = CsvSink::new(identity_last("url", &["eval_count"]));
    let summary = pipeline()
        .run_scripts(
            stage,
            vec![Batch::new(candidates(&["down.example"]), Label::Legitimate)
                .with_legal_resolution()],
            &mut sink,
        )
        .await;

    assert_eq!(summary.dropped, 1);
    assert!(sink.is_empty());
}

// ── HTML pipeline ────────────────────────────────────────────────────────────

#[test]
fn test_html_pipeline_reads_directories() {
    let phish_dir = tempfile::tempdir().unwrap();
    let legit_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        phish_dir.path().join("a.html"),
        r#"<form><input type="password"></form><a href="https://x.example">Login</a>"#,
    )
    .unwrap();
    std::fs::write(legit_dir.path().join("b.html"), "<p>Welcome</p>").unwrap();

    let mut sink = CsvSink::new(identity_first("file", HTML_FEATURE_NAMES));
    let summary = pipeline()
        .run_html(
            &[
                PageDirectory {
                    path: phish_dir.path().to_path_buf(),
                    label: Label::Phishing,
                },
                PageDirectory {
                    path: legit_dir.path().to_path_buf(),
                    label: Label::Legitimate,
                },
            ],
            &mut sink,
        )
        .unwrap();

    assert_eq!(summary.emitted, 2);
    let phish = row_for(&sink, "a.html");
    assert_eq!(phish.label, Label::Phishing);
    assert_eq!(phish.features.get("has_password_field"), Some(1.0));
    assert_eq!(phish.features.get("num_forms"), Some(1.0));

    let legit = row_for(&sink, "b.html");
    assert_eq!(legit.features.get("num_links"), Some(0.0));
}

#[test]
fn test_html_pipeline_missing_directory() {
    let mut sink = CsvSink::new(identity_first("file", HTML_FEATURE_NAMES));
    let result = pipeline().run_html(
        &[PageDirectory {
            path: "/nonexistent/pages".into(),
            label: Label::Phishing,
        }],
        &mut sink,
    );
    assert!(matches!(result, Err(PipelineError::FileError { .. })));
}
