//! wnscrape: CLI scraper for Royal Road and Wuxiaworld web novels, outputting EPUB.

pub mod cli;
pub mod config;
pub mod epub;
pub mod normalize;
pub mod site;

// Re-exports for CLI and consumers.
pub use epub::{assemble, AssembleOptions, EpubError};
pub use normalize::normalize;
pub use site::{
    Book, Chapter, PageClient, PageClientBuilder, PageSource, ScraperError, Site, SiteStrategy,
};
