//! Wuxiaworld. Books are addressed by path fragment (or full URL), chapters by full URL.
//!
//! Each chapter row on a book page links to several `-chapter-` targets; only links under
//! the index page that repeats most often are the book's own chapters.

use crate::site::error::ScraperError;
use crate::site::{anchor_hrefs, majority_token, select_outer_xhtml, select_text};
use crate::site::SiteStrategy;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::Html;

const WUXIAWORLD_BASE: &str = "http://www.wuxiaworld.com";
static CHAPTER_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)-chapter-").unwrap());
/// Book headings end with a fixed suffix of this many words (e.g. "123 Chapters Available").
const TITLE_SUFFIX_WORDS: usize = 3;
/// Position of the index-page token in `scheme://host/token/...` split on `/`.
const INDEX_TOKEN_SEGMENT: usize = 3;

pub struct WuxiaWorld;

impl SiteStrategy for WuxiaWorld {
    fn book_url(&self, locator: &str) -> String {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return locator.to_string();
        }
        format!("{}/{}", WUXIAWORLD_BASE, locator.trim_start_matches('/'))
    }

    fn book_title(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        Ok(select_text(page, ".entry-header h1")?.map(|t| strip_suffix_words(&t)))
    }

    fn book_author(&self, _page: &Html) -> Result<Option<String>, ScraperError> {
        Ok(Some("unknown".to_string()))
    }

    fn chapter_locators(&self, page: &Html, base: &Url) -> Result<Vec<String>, ScraperError> {
        let links: Vec<String> = anchor_hrefs(page, base)?
            .into_iter()
            .filter(|href| CHAPTER_LINK.is_match(href))
            .collect();
        Ok(filter_by_majority_index(links))
    }

    fn chapter_url(&self, locator: &str) -> String {
        locator.to_string()
    }

    fn chapter_title(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        select_text(page, ".entry-header h1")
    }

    fn chapter_body(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        select_outer_xhtml(page, "div[itemprop=\"articleBody\"]")
    }
}

fn index_token(href: &str) -> Option<&str> {
    href.split('/')
        .nth(INDEX_TOKEN_SEGMENT)
        .filter(|s| !s.is_empty())
}

/// Keep the links that mention the most frequent index token, in their original order.
fn filter_by_majority_index(links: Vec<String>) -> Vec<String> {
    let index = match majority_token(links.iter().filter_map(|l| index_token(l))) {
        Some(t) => t.to_lowercase(),
        None => return Vec::new(),
    };
    log::debug!("Chapter index token: {}", index);
    links
        .into_iter()
        .filter(|l| l.to_lowercase().contains(&index))
        .collect()
}

/// Drop the trailing count suffix. A heading too short to carry one is kept whole.
fn strip_suffix_words(heading: &str) -> String {
    let words: Vec<&str> = heading.split_whitespace().collect();
    if words.len() <= TITLE_SUFFIX_WORDS {
        return words.join(" ");
    }
    words[..words.len() - TITLE_SUFFIX_WORDS].join(" ")
}
