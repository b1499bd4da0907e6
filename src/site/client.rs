//! Blocking HTTP client used to read book and chapter pages.

use crate::site::error::ScraperError;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; wnscrape/0.1)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Anything that can turn a page URL into its HTML body.
///
/// [PageClient] is the network implementation; tests substitute saved pages.
pub trait PageSource {
    fn fetch(&self, url: &str) -> Result<String, ScraperError>;
}

/// Blocking HTTP client. One GET per call; no retries.
#[derive(Debug)]
pub struct PageClient {
    inner: reqwest::blocking::Client,
}

impl PageClient {
    /// Build a client with default User-Agent and timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PageClientBuilder {
        PageClientBuilder::default()
    }
}

impl PageSource for PageClient {
    fn fetch(&self, url: &str) -> Result<String, ScraperError> {
        log::debug!("GET {}", url);
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        // Undecodable bytes come back as U+FFFD and are replaced later by the normalizer.
        response.text().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }
}

/// Builder for PageClient with optional User-Agent and timeout.
#[derive(Debug)]
pub struct PageClientBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for PageClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl PageClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<PageClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PageClient { inner })
    }
}
