//! Reading a bulletin's first page.
//!
//! [`DocumentReader`] is the seam between the orchestrator and the outside
//! world: the production [`HttpPdfReader`] downloads the PDF and renders page
//! 1, tests substitute readers that return canned lines.
//!
//! Retry strategy for downloads:
//! - network errors, timeouts, HTTP 429 and 5xx → retry with exponential backoff
//! - other HTTP errors → fail immediately

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::PipelineError;
use crate::extract;
use crate::models::RawPage;
use crate::retry::RetryPolicy;

#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Returns the text lines of page 1 of the document at `link`.
    async fn read_first_page(&self, link: &str) -> Result<RawPage, PipelineError>;
}

/// Builds the HTTP client used for the source page and documents.
pub fn build_client(http: &HttpConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs))
        .user_agent(concat!("bulletin-ingest/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub struct HttpPdfReader {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpPdfReader {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Downloads `link` with backoff.
    pub async fn fetch_bytes(&self, link: &str) -> Result<Vec<u8>, PipelineError> {
        self.retry
            .run("fetch", || fetch_once(&self.client, link))
            .await
    }
}

#[async_trait]
impl DocumentReader for HttpPdfReader {
    async fn read_first_page(&self, link: &str) -> Result<RawPage, PipelineError> {
        let bytes = self.fetch_bytes(link).await?;
        debug!(link, bytes = bytes.len(), "downloaded document");

        // pdf-extract is CPU-bound; keep it off the async workers.
        let text = tokio::task::spawn_blocking(move || extract::first_page_text(&bytes))
            .await
            .map_err(|e| PipelineError::Parse {
                link: link.to_string(),
                reason: format!("extraction task failed: {}", e),
            })?
            .map_err(|e| PipelineError::Parse {
                link: link.to_string(),
                reason: e.to_string(),
            })?;

        Ok(RawPage::from_text(&text))
    }
}

async fn fetch_once(client: &reqwest::Client, link: &str) -> Result<Vec<u8>, PipelineError> {
    let fetch_err = |reason: String, transient: bool| PipelineError::Fetch {
        link: link.to_string(),
        reason,
        transient,
    };

    let resp = client
        .get(link)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string(), true))?;

    let status = resp.status();
    if !status.is_success() {
        let transient = status.as_u16() == 429 || status.is_server_error();
        return Err(fetch_err(format!("HTTP {}", status), transient));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| fetch_err(format!("reading body: {}", e), true))?;
    Ok(bytes.to_vec())
}
