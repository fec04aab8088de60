use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, ClientBuilder, StatusCode};

use lote_trust_shared::uri::Uri;

use crate::env;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const TOKEN_ACCEPT: &str = "application/jose, text/plain";

/// Result of resolving a URI to token text. Absence is a value, not an
/// error; anything else that goes wrong is an `Err` and surfaces as an
/// `Error` problem in the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded(String),
    NotFound { cause: Option<String> },
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, uri: &Uri) -> anyhow::Result<FetchOutcome>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_env() -> Result<Self, reqwest::Error> {
        let timeout_secs = env::LOTE_FETCH_TIMEOUT_SECS
            .default(DEFAULT_FETCH_TIMEOUT_SECS)
            .value;
        Self::new(Duration::from_secs(timeout_secs))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, uri: &Uri) -> anyhow::Result<FetchOutcome> {
        tracing::debug!(uri = %uri, "Requesting list token");
        let response = self
            .client
            .get(uri.as_str())
            .header(ACCEPT, TOKEN_ACCEPT)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to make request {uri}: {e:#?}"))?;

        let status = response.status();
        tracing::debug!(
            uri = %uri,
            "Received response with status {} and content length {}",
            status,
            response
                .content_length()
                .map(|v| v.to_string())
                .unwrap_or("[unknown]".to_string())
        );

        if status == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound {
                cause: Some(format!("HTTP 404 for {uri}")),
            });
        }

        let body = response
            .error_for_status()
            .map_err(|e| anyhow!("Unsuccessful status code for {uri}: {e:#?}"))?
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body for {uri}: {e:#?}"))?;
        Ok(FetchOutcome::Loaded(body))
    }
}

/// Resolves `file://` URIs (and bare paths) against an optional base
/// directory. Used for offline provisioning and tests.
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, uri: &Uri) -> PathBuf {
        let raw = uri.as_str().strip_prefix("file://").unwrap_or(uri.as_str());
        let path = Path::new(raw);
        match (&self.base_dir, path.is_absolute()) {
            (Some(base), false) => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for FileFetcher {
    async fn fetch(&self, uri: &Uri) -> anyhow::Result<FetchOutcome> {
        let path = self.resolve(uri);
        tracing::debug!(uri = %uri, "Reading list token from file {path:?}");
        if !path.exists() {
            return Ok(FetchOutcome::NotFound {
                cause: Some(format!("No such file {path:?}")),
            });
        }
        let content = crate::utils::read_string(&path)
            .map_err(|e| anyhow!("Failed to read {path:?}: {e:#?}"))?;
        Ok(FetchOutcome::Loaded(content))
    }
}
