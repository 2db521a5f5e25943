//! Portfolio content sources.
//!
//! `ContentFetcher::fetch_content` never fails: any source error is logged
//! and replaced by `PortfolioContent::fallback`.

use std::error::Error as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{parse::parse_portfolio, PortfolioContent};

const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url {0}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that produces raw portfolio markup.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;

    /// Name of this source for logging
    fn name(&self) -> &'static str;
}

/// Fetches the portfolio page over HTTP with bounded retries.
pub struct HttpSource {
    url: reqwest::Url,
    client: reqwest::Client,
    timeout: Duration,
    max_attempts: u32,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration, max_attempts: u32) -> Result<Self, FetchError> {
        let mut url = url.to_string();
        if url.starts_with("//") {
            url = format!("https:{url}");
        }

        let url = reqwest::Url::parse(&url).map_err(|err| FetchError::InvalidUrl(url, err))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT_DEFAULT)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| FetchError::Request(get_error(&err)))?;

        Ok(Self {
            url,
            client,
            timeout,
            max_attempts: max_attempts.max(1),
        })
    }
}

/// Innermost cause of a reqwest error, usually the useful part.
fn get_error(error: &reqwest::Error) -> String {
    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        let iden = format!("{}{}", self.url.host_str().unwrap_or_default(), self.url.path());

        let mut attempt: u32 = 0;
        let mut last_error = FetchError::Request("no attempt made".to_string());

        while attempt < self.max_attempts {
            if attempt > 0 {
                log::debug!("{iden}: retrying");
            }
            attempt += 1;

            log::debug!("{iden}: requesting");
            let request = self.client.get(self.url.clone()).send();

            let resp = match tokio::time::timeout(self.timeout, request).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(err)) => {
                    log::warn!("{iden}: {err}: {}", get_error(&err));
                    last_error = if err.is_timeout() {
                        FetchError::Timeout(self.timeout)
                    } else {
                        FetchError::Request(get_error(&err))
                    };
                    continue;
                }
                Err(_) => {
                    log::warn!("{iden}: timed out");
                    last_error = FetchError::Timeout(self.timeout);
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                return resp
                    .text()
                    .await
                    .map_err(|err| FetchError::Request(get_error(&err)));
            }

            log::debug!("{iden}: {status}");
            last_error = FetchError::Status(status);

            if status == StatusCode::TOO_MANY_REQUESTS {
                tokio::time::sleep(Duration::from_secs(u64::from(attempt) * 2)).await;
                continue;
            }

            if status.is_client_error() {
                // no point in asking again
                break;
            }
        }

        Err(last_error)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Reads the portfolio markup from a local file.
pub struct StaticSource {
    path: PathBuf,
}

impl StaticSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        let path = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(path))
            .await
            .map_err(|err| FetchError::Request(err.to_string()))??;

        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Turns a content source into `PortfolioContent`, absorbing every failure.
#[derive(Clone)]
pub struct ContentFetcher {
    source: Arc<dyn ContentSource>,
    owner_name: String,
}

impl ContentFetcher {
    pub fn new(source: Arc<dyn ContentSource>, owner_name: impl Into<String>) -> Self {
        Self {
            source,
            owner_name: owner_name.into(),
        }
    }

    pub async fn fetch_content(&self) -> PortfolioContent {
        let name = self.source.name();

        let markup = match self.source.fetch().await {
            Ok(markup) => markup,
            Err(err) => {
                log::warn!("source={name} outcome=error err={err}, using fallback content");
                return PortfolioContent::fallback(&self.owner_name);
            }
        };

        let content = parse_portfolio(&markup);
        if content.is_blank() {
            log::warn!("source={name} outcome=empty, using fallback content");
            return PortfolioContent::fallback(&self.owner_name);
        }

        log::info!("source={name} outcome=success bytes={}", markup.len());
        content
    }
}
