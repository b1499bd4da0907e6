//! Shared error type for page fetching and site extraction.

use thiserror::Error;

/// Fetch and markup-shape failures. Every variant names the URL or locator involved.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    /// Expected element is missing or empty (selector or site markup may have changed).
    #[error("Could not find {what} at {url} ({locator})")]
    MissingElement {
        what: &'static str,
        locator: String,
        url: String,
    },

    #[error("No chapter links found on book page {url}")]
    EmptyChapterList { url: String },
}
