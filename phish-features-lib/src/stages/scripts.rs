//! Script-content resolution stage.

use crate::concurrent::Resolution;
use crate::error::PipelineError;
use crate::fallback::FallbackChain;
use crate::features::{aggregate_max, FeatureExtractor, PageDocument};
use crate::protocols::{HttpFetcher, HttpResponse};
use crate::types::{Candidate, FeatureRow, Label, PipelineConfig, ScriptIntermediate};
use crate::utils::{legal_url_variants, page_url};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Fetches a page and every script it carries, then runs the extractor on
/// each script body.
#[derive(Clone)]
pub struct ScriptStage {
    http: Arc<dyn HttpFetcher>,
    extractor: Arc<dyn FeatureExtractor>,
    page_timeout: Duration,
    script_timeout: Duration,
    probe_timeout: Duration,
}

impl ScriptStage {
    pub fn new(http: Arc<dyn HttpFetcher>, extractor: Arc<dyn FeatureExtractor>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            http,
            extractor,
            page_timeout: defaults.page_timeout,
            script_timeout: defaults.script_timeout,
            probe_timeout: defaults.probe_timeout,
        }
    }

    pub fn with_timeouts(mut self, page: Duration, script: Duration, probe: Duration) -> Self {
        self.page_timeout = page;
        self.script_timeout = script;
        self.probe_timeout = probe;
        self
    }

    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }

    /// Resolve one candidate into its per-script feature vectors.
    ///
    /// With `resolve_legal` the candidate is treated as a bare domain and the
    /// first scheme/host variant answering with a 2xx status is used.
    pub async fn resolve(
        &self,
        candidate: &Candidate,
        resolve_legal: bool,
    ) -> Result<Resolution<ScriptIntermediate>, PipelineError> {
        let fetched = if resolve_legal {
            self.fetch_legal(candidate).await?
        } else {
            self.fetch_direct(candidate).await
        };

        let Some((requested_url, page)) = fetched else {
            return Ok(Resolution::Dropped);
        };

        let document = PageDocument::parse(&page.body);
        let mut bodies: Vec<String> = document.inline_scripts().map(str::to_string).collect();

        let base = Url::parse(&page.url).or_else(|_| Url::parse(&requested_url));
        let external: Vec<String> = match &base {
            Ok(base) => document
                .external_scripts()
                .filter_map(|src| match base.join(src) {
                    Ok(resolved) => Some(resolved.to_string()),
                    Err(err) => {
                        debug!("skipping script '{}' on {}: {}", src, requested_url, err);
                        None
                    }
                })
                .collect(),
            Err(err) => {
                debug!("{}: unusable base URL: {}", requested_url, err);
                Vec::new()
            }
        };

        let fetches = external.iter().map(|url| self.fetch_script(url));
        bodies.extend(join_all(fetches).await.into_iter().flatten());

        let vectors: Vec<_> = bodies
            .iter()
            .filter(|body| !body.is_empty())
            .map(|body| self.extractor.extract(body))
            .collect();

        if vectors.is_empty() {
            debug!("{}: no script bodies", requested_url);
            return Ok(Resolution::Dropped);
        }

        Ok(Resolution::Resolved(ScriptIntermediate {
            page_url: requested_url,
            vectors,
        }))
    }

    async fn fetch_legal(
        &self,
        candidate: &Candidate,
    ) -> Result<Option<(String, HttpResponse)>, PipelineError> {
        let host = candidate
            .host
            .as_deref()
            .ok_or_else(|| PipelineError::invalid_candidate(&candidate.raw, "no host"))?;

        let chain = FallbackChain::new(legal_url_variants(host));
        let probe_timeout = self.probe_timeout;
        let found = chain
            .first_success(|url| {
                let http = Arc::clone(&self.http);
                async move {
                    let response = http.get(&url, probe_timeout).await?;
                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(PipelineError::http_status(&url, response.status))
                    }
                }
            })
            .await;

        if found.is_none() {
            debug!("{}: no variant answered with success", host);
        }
        Ok(found)
    }

    async fn fetch_direct(&self, candidate: &Candidate) -> Option<(String, HttpResponse)> {
        let url = page_url(&candidate.raw);
        match self.http.get(&url, self.page_timeout).await {
            Ok(response) => Some((url, response)),
            Err(err) => {
                debug!("page fetch failed: {}", err);
                None
            }
        }
    }

    async fn fetch_script(&self, url: &str) -> Option<String> {
        match self.http.get(url, self.script_timeout).await {
            Ok(response) if response.is_success() => Some(response.body),
            Ok(response) => {
                debug!("script {} answered {}", url, response.status);
                None
            }
            Err(err) => {
                debug!("script fetch failed: {}", err);
                None
            }
        }
    }
}

/// Fold the per-script vectors of one page into its output row.
///
/// `None` when the page carried no vectors.
pub fn script_feature_row(intermediate: &ScriptIntermediate, label: Label) -> Option<FeatureRow> {
    let features = aggregate_max(&intermediate.vectors)?;
    Some(FeatureRow {
        identity: intermediate.page_url.clone(),
        features,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::JsFeatureExtractor;
    use crate::types::FeatureVector;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, (u16, String)>,
        requested: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn page(mut self, url: &str, status: u16, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (status, body.to_string()));
            self
        }
    }

    #[async_trait]
    impl HttpFetcher for StaticFetcher {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, PipelineError> {
            self.requested.lock().unwrap().push(url.to_string());
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

    fn stage(fetcher: StaticFetcher) -> (ScriptStage, Arc<StaticFetcher>) {
        let fetcher = Arc::new(fetcher);
        let stage = ScriptStage::new(fetcher.clone(), Arc::new(JsFeatureExtractor::new()));
        (stage, fetcher)
    }

    #[tokio::test]
    async fn test_inline_and_external_scripts() {
        let page = r#"<html><head>
            <script>eval(a); eval(b);</script>
            <script src="/static/app.js"></script>
            <script src="https://cdn.example.net/missing.js"></script>
        </head></html>"#;
        let (stage, _) = stage(
            StaticFetcher::default()
                .page("http://phish.example/login", 200, page)
                .page("http://phish.example/static/app.js", 200, "eval(x)"),
        );

        let resolution = stage
            .resolve(&Candidate::new("http://phish.example/login"), false)
            .await
            .unwrap();

        let Resolution::Resolved(intermediate) = resolution else {
            panic!("expected a resolved page");
        };
        assert_eq!(intermediate.page_url, "http://phish.example/login");
        assert_eq!(intermediate.vectors.len(), 2);

        let row = script_feature_row(&intermediate, Label::Phishing).unwrap();
        assert_eq!(row.features.get("eval_count"), Some(2.0));
    }

    #[tokio::test]
    async fn test_page_without_scripts_is_dropped() {
        let (stage, _) = stage(StaticFetcher::default().page(
            "http://plain.example",
            200,
            "<html><body><p>hello</p></body></html>",
        ));

        let resolution = stage
            .resolve(&Candidate::new("plain.example"), false)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Dropped);
    }

    #[tokio::test]
    async fn test_whitespace_only_script_still_yields_row() {
        let (stage, _) = stage(
            StaticFetcher::default()
                .page("http://blank.example", 200, "<script>\n  </script><script src=\"/empty.js\"></script>")
                .page("http://blank.example/empty.js", 200, ""),
        );

        let resolution = stage
            .resolve(&Candidate::new("blank.example"), false)
            .await
            .unwrap();

        let Resolution::Resolved(intermediate) = resolution else {
            panic!("expected a resolved page");
        };
        assert_eq!(intermediate.vectors.len(), 1);
        assert_eq!(intermediate.vectors[0].get("length"), Some(3.0));
    }

    #[tokio::test]
    async fn test_unreachable_page_is_dropped() {
        let (stage, _) = stage(StaticFetcher::default());
        let resolution = stage
            .resolve(&Candidate::new("http://gone.example"), false)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Dropped);
    }

    #[tokio::test]
    async fn test_legal_resolution_probes_in_order() {
        let (stage, fetcher) = stage(
            StaticFetcher::default()
                .page("https://example.org", 503, "<script>a()</script>")
                .page("http://example.org", 200, "<script>b()</script>"),
        );

        let resolution = stage
            .resolve(&Candidate::new("example.org"), true)
            .await
            .unwrap();

        let Resolution::Resolved(intermediate) = resolution else {
            panic!("expected a resolved page");
        };
        assert_eq!(intermediate.page_url, "http://example.org");
        assert_eq!(
            *fetcher.requested.lock().unwrap(),
            vec![
                "https://example.org",
                "https://www.example.org",
                "http://example.org",
            ]
        );
    }

    #[test]
    fn test_empty_page_has_no_row() {
        let empty = ScriptIntermediate {
            page_url: "http://a.example".to_string(),
            vectors: Vec::<FeatureVector>::new(),
        };
        assert!(script_feature_row(&empty, Label::Legitimate).is_none());
    }
}
