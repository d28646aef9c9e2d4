//! HTTP fetching for pages and external scripts.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::time::Duration;

/// Status and decoded body of one GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `get(url, timeout) -> { status, body } | error`.
///
/// Non-success statuses are returned as responses, not errors; callers
/// decide what a 404 means for them.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, PipelineError>;
}

/// HTTP fetcher backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestFetcher {
    http_client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, PipelineError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("phish-features/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| PipelineError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, PipelineError> {
        let request = async {
            let response = self.http_client.get(url).send().await?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(HttpResponse {
                status,
                url: final_url,
                body,
            })
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => Err(PipelineError::timeout(
                format!("HTTP GET {}", url),
                timeout,
            )),
            Ok(Err(e)) => Err(PipelineError::http(url, e.to_string())),
            Err(_) => Err(PipelineError::timeout(format!("HTTP GET {}", url), timeout)),
        }
    }
}
