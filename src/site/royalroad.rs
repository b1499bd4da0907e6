//! Royal Road. Books and chapters are addressed by numeric id.
//!
//! The fiction page lists every chapter as a `fiction/chapter/{id}` link, preceded by
//! one "start reading" link to the first chapter.

use crate::site::error::ScraperError;
use crate::site::{
    anchor_hrefs, last_child_text, parse_selector, select_outer_xhtml, select_text,
};
use crate::site::SiteStrategy;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::Html;

const ROYALROAD_BASE: &str = "http://royalroadl.com";
static CHAPTER_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)fiction/chapter").unwrap());

pub struct RoyalRoad;

impl SiteStrategy for RoyalRoad {
    fn book_url(&self, locator: &str) -> String {
        format!("{}/fiction/{}", ROYALROAD_BASE, locator)
    }

    fn book_title(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        select_text(page, ".fic-header h2")
    }

    fn book_author(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        let sel = parse_selector(".fic-header h4")?;
        Ok(page.select(&sel).next().and_then(last_child_text))
    }

    fn chapter_locators(&self, page: &Html, base: &Url) -> Result<Vec<String>, ScraperError> {
        Ok(anchor_hrefs(page, base)?
            .into_iter()
            .filter(|href| CHAPTER_LINK.is_match(href))
            .skip(1)
            .filter_map(|href| chapter_id(&href))
            .collect())
    }

    fn chapter_url(&self, locator: &str) -> String {
        format!("{}/fiction/chapter/{}", ROYALROAD_BASE, locator)
    }

    fn chapter_title(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        select_text(page, ".fic-header h2")
    }

    fn chapter_body(&self, page: &Html) -> Result<Option<String>, ScraperError> {
        select_outer_xhtml(page, ".chapter-content")
    }
}

/// Last path segment of a chapter link, ignoring query, fragment and trailing slash.
fn chapter_id(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(String::from)
}
