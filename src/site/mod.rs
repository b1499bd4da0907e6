//! Site variants, page fetching, and the lazily fetched [Book] and [Chapter] values.
//!
//! Each site supplies a [SiteStrategy]: URL templates plus selectors. [Book] and [Chapter]
//! fetch their page on first use and keep the parsed document for the rest of the run.

mod client;
mod error;

pub mod royalroad;
pub mod wuxiaworld;

pub use client::{PageClient, PageClientBuilder, PageSource};
pub use error::ScraperError;

use crate::normalize::normalize;
use once_cell::unsync::OnceCell;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

/// Stylesheet file name shared by every chapter document and the package.
pub const STYLESHEET_NAME: &str = "stylesheet.css";

/// Supported fiction site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    RoyalRoad,
    WuxiaWorld,
}

impl Site {
    /// Choose a site from the command-line locator: a positive integer is a Royal Road
    /// fiction id, anything else is a Wuxiaworld book path or URL.
    pub fn from_locator(arg: &str) -> (Site, String) {
        let arg = arg.trim();
        match arg.parse::<u64>() {
            Ok(id) if id > 0 => (Site::RoyalRoad, id.to_string()),
            _ => (Site::WuxiaWorld, arg.to_string()),
        }
    }

    pub fn strategy(self) -> &'static dyn SiteStrategy {
        match self {
            Site::RoyalRoad => &royalroad::RoyalRoad,
            Site::WuxiaWorld => &wuxiaworld::WuxiaWorld,
        }
    }
}

/// Extraction rules for one site. Implementations are stateless.
pub trait SiteStrategy {
    fn book_url(&self, locator: &str) -> String;

    /// Book title from the landing page, or None if the markup has no title.
    fn book_title(&self, page: &Html) -> Result<Option<String>, ScraperError>;

    fn book_author(&self, page: &Html) -> Result<Option<String>, ScraperError>;

    /// Chapter locators in reading order. `base` is the landing page URL, used to resolve
    /// relative links.
    fn chapter_locators(&self, page: &Html, base: &Url) -> Result<Vec<String>, ScraperError>;

    fn chapter_url(&self, locator: &str) -> String;

    fn chapter_title(&self, page: &Html) -> Result<Option<String>, ScraperError>;

    /// Outer markup of the chapter content element.
    fn chapter_body(&self, page: &Html) -> Result<Option<String>, ScraperError>;
}

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::Selector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Trimmed text of the first element matching `sel`; None when missing or blank.
pub(crate) fn select_text(page: &Html, sel: &str) -> Result<Option<String>, ScraperError> {
    let selector = parse_selector(sel)?;
    Ok(page
        .select(&selector)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Elements that never have content; written self-closed.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Outer markup of the first element matching `sel`, serialized as XHTML.
pub(crate) fn select_outer_xhtml(page: &Html, sel: &str) -> Result<Option<String>, ScraperError> {
    let selector = parse_selector(sel)?;
    Ok(page.select(&selector).next().map(|e| {
        let mut out = String::new();
        write_xhtml(e, &mut out);
        out
    }))
}

/// Serialize an element subtree as well-formed XML. Text keeps its decoded characters
/// (a no-break space stays U+00A0, not `&nbsp;`); only markup characters are escaped.
/// Comments and processing instructions are dropped.
fn write_xhtml(element: ElementRef<'_>, out: &mut String) {
    let el = element.value();
    out.push('<');
    out.push_str(el.name());
    for (name, value) in el.attrs() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&html_escape(value));
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&el.name()) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&html_escape(text));
        } else if let Some(child) = ElementRef::wrap(child) {
            write_xhtml(child, out);
        }
    }
    out.push_str("</");
    out.push_str(el.name());
    out.push('>');
}

/// Every anchor href on the page resolved against `base`, in document order.
/// Hrefs that do not form a valid URL are dropped.
pub(crate) fn anchor_hrefs(page: &Html, base: &Url) -> Result<Vec<String>, ScraperError> {
    let selector = parse_selector("a[href]")?;
    Ok(page
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
        .collect())
}

/// Text of an element's last child that has any non-whitespace text.
pub(crate) fn last_child_text(element: ElementRef<'_>) -> Option<String> {
    element
        .children()
        .filter_map(|node| {
            if let Some(text) = node.value().as_text() {
                Some(text.to_string())
            } else {
                ElementRef::wrap(node).map(|e| e.text().collect::<String>())
            }
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .last()
}

/// The token that occurs most often. Ties go to the token seen first.
pub fn majority_token<'t>(tokens: impl IntoIterator<Item = &'t str>) -> Option<&'t str> {
    // token -> (count, index of first occurrence)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, token) in tokens.into_iter().enumerate() {
        counts.entry(token).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (n, first)), (_, (m, other))| n.cmp(m).then(other.cmp(first)))
        .map(|(token, _)| token)
}

fn fetch_html(source: &dyn PageSource, url: &str) -> Result<Html, ScraperError> {
    let body = source.fetch(url)?;
    Ok(Html::parse_document(&body))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One book on one site. The landing page and chapter list are fetched once.
pub struct Book<'a> {
    site: Site,
    locator: String,
    source: &'a dyn PageSource,
    page: OnceCell<Html>,
    chapters: OnceCell<Vec<Chapter<'a>>>,
}

impl<'a> Book<'a> {
    pub fn new(site: Site, locator: impl Into<String>, source: &'a dyn PageSource) -> Self {
        Self {
            site,
            locator: locator.into(),
            source,
            page: OnceCell::new(),
            chapters: OnceCell::new(),
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn url(&self) -> String {
        self.site.strategy().book_url(&self.locator)
    }

    fn page(&self) -> Result<&Html, ScraperError> {
        self.page.get_or_try_init(|| {
            let url = self.url();
            log::info!("Fetching book page {}", url);
            fetch_html(self.source, &url)
        })
    }

    fn missing(&self, what: &'static str) -> ScraperError {
        ScraperError::MissingElement {
            what,
            locator: self.locator.clone(),
            url: self.url(),
        }
    }

    pub fn title(&self) -> Result<String, ScraperError> {
        self.site
            .strategy()
            .book_title(self.page()?)?
            .ok_or_else(|| self.missing("book title"))
    }

    pub fn author(&self) -> Result<String, ScraperError> {
        self.site
            .strategy()
            .book_author(self.page()?)?
            .ok_or_else(|| self.missing("book author"))
    }

    pub fn chapter_locators(&self) -> Result<Vec<String>, ScraperError> {
        let url = self.url();
        let base = Url::parse(&url).map_err(|_| self.missing("valid book URL"))?;
        let locators = self
            .site
            .strategy()
            .chapter_locators(self.page()?, &base)?;
        if locators.is_empty() {
            return Err(ScraperError::EmptyChapterList { url });
        }
        log::info!("Found {} chapters for {}", locators.len(), url);
        Ok(locators)
    }

    /// One [Chapter] per discovered locator, in reading order.
    pub fn chapters(&self) -> Result<&[Chapter<'a>], ScraperError> {
        self.chapters
            .get_or_try_init(|| {
                Ok(self
                    .chapter_locators()?
                    .into_iter()
                    .map(|l| Chapter::new(self.site, l, self.source))
                    .collect())
            })
            .map(Vec::as_slice)
    }
}

/// One chapter page. Fetched on first access, then reused.
pub struct Chapter<'a> {
    site: Site,
    locator: String,
    source: &'a dyn PageSource,
    page: OnceCell<Html>,
}

impl<'a> Chapter<'a> {
    pub fn new(site: Site, locator: impl Into<String>, source: &'a dyn PageSource) -> Self {
        Self {
            site,
            locator: locator.into(),
            source,
            page: OnceCell::new(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn url(&self) -> String {
        self.site.strategy().chapter_url(&self.locator)
    }

    fn page(&self) -> Result<&Html, ScraperError> {
        self.page.get_or_try_init(|| {
            let url = self.url();
            log::debug!("Fetching chapter {}", url);
            fetch_html(self.source, &url)
        })
    }

    fn missing(&self, what: &'static str) -> ScraperError {
        ScraperError::MissingElement {
            what,
            locator: self.locator.clone(),
            url: self.url(),
        }
    }

    pub fn title(&self) -> Result<String, ScraperError> {
        self.site
            .strategy()
            .chapter_title(self.page()?)?
            .ok_or_else(|| self.missing("chapter title"))
    }

    /// Raw chapter content markup as served by the site.
    pub fn body(&self) -> Result<String, ScraperError> {
        self.site
            .strategy()
            .chapter_body(self.page()?)?
            .ok_or_else(|| self.missing("chapter content"))
    }

    pub fn cleaned_body(&self) -> Result<String, ScraperError> {
        Ok(normalize(&self.body()?))
    }

    /// Standalone chapter document: stylesheet link, `<h2>` title, then cleaned content.
    /// The stylesheet is referenced from the package's `text/` directory.
    pub fn document(&self) -> Result<String, ScraperError> {
        let title = html_escape(&self.title()?);
        let body = self.cleaned_body()?;
        Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link href="../{css}" type="text/css" rel="stylesheet"/>
</head>
<body>
<h2>{title}</h2>
{body}
</body>
</html>
"#,
            title = title,
            css = STYLESHEET_NAME,
            body = body
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// In-memory pages keyed by URL. Records every URL requested.
    #[derive(Default)]
    pub(crate) struct FixturePages {
        pages: HashMap<String, String>,
        pub(crate) requests: RefCell<Vec<String>>,
    }

    impl FixturePages {
        pub(crate) fn with(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    impl PageSource for FixturePages {
        fn fetch(&self, url: &str) -> Result<String, ScraperError> {
            self.requests.borrow_mut().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScraperError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    #[test]
    fn from_locator_picks_site_by_number() {
        assert_eq!(
            Site::from_locator("21220"),
            (Site::RoyalRoad, "21220".to_string())
        );
        assert_eq!(
            Site::from_locator("desolate-era"),
            (Site::WuxiaWorld, "desolate-era".to_string())
        );
        assert_eq!(Site::from_locator("0").0, Site::WuxiaWorld);
        assert_eq!(Site::from_locator("-4").0, Site::WuxiaWorld);
        assert_eq!(Site::from_locator("12abc").0, Site::WuxiaWorld);
    }

    #[test]
    fn majority_token_counts_and_breaks_ties_by_first_seen() {
        assert_eq!(majority_token(["a", "b", "b", "c"]), Some("b"));
        assert_eq!(majority_token(["x", "y", "y", "x"]), Some("x"));
        assert_eq!(majority_token(Vec::<&str>::new()), None);
    }

    #[test]
    fn last_child_text_skips_trailing_whitespace() -> Result<(), ScraperError> {
        let doc = Html::parse_fragment("<h4><span>by </span><a>Someone</a>\n  </h4>");
        let sel = parse_selector("h4")?;
        let h4 = doc.select(&sel).next().ok_or_else(|| ScraperError::Selector {
            selector: "h4".to_string(),
            reason: "no match".to_string(),
        })?;
        assert_eq!(last_child_text(h4).as_deref(), Some("Someone"));
        Ok(())
    }

    #[test]
    fn chapter_page_is_fetched_once() -> Result<(), ScraperError> {
        let pages = FixturePages::default().with(
            "http://royalroadl.com/fiction/chapter/7",
            r#"<div class="fic-header"><h2>Seven</h2></div><div class="chapter-content"><p>x</p></div>"#,
        );
        let chapter = Chapter::new(Site::RoyalRoad, "7", &pages);
        assert_eq!(chapter.title()?, "Seven");
        chapter.body()?;
        chapter.document()?;
        assert_eq!(pages.requests.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn chapter_document_links_stylesheet_and_cleans_body() -> Result<(), ScraperError> {
        let pages = FixturePages::default().with(
            "http://royalroadl.com/fiction/chapter/9",
            "<div class=\"fic-header\"><h2>Tom &amp; Jerry</h2></div><div class=\"chapter-content\"><p>\u{201c}Wait\u{2026}\u{201d}</p></div>",
        );
        let chapter = Chapter::new(Site::RoyalRoad, "9", &pages);
        let doc = chapter.document()?;
        assert!(doc.contains(r#"<link href="../stylesheet.css" type="text/css" rel="stylesheet"/>"#));
        assert!(doc.contains("<h2>Tom &amp; Jerry</h2>"));
        assert!(doc.contains("<p>\"Wait...\"</p>"));
        let h2 = doc.find("<h2>").unwrap_or(usize::MAX);
        let content = doc.find("chapter-content").unwrap_or(0);
        assert!(h2 < content, "title must precede the body");
        Ok(())
    }

    #[test]
    fn chapter_body_is_serialized_as_xhtml() -> Result<(), ScraperError> {
        let pages = FixturePages::default().with(
            "http://royalroadl.com/fiction/chapter/11",
            "<div class=\"fic-header\"><h2>Eleven</h2></div><div class=\"chapter-content\"><p>a\u{00a0}b&nbsp;c</p><p>line<br>next</p><p>x &lt; y &amp; z<img src=\"map.png\" alt=\"a &quot;map&quot;\"></p><!-- ad --></div>",
        );
        let chapter = Chapter::new(Site::RoyalRoad, "11", &pages);
        let doc = chapter.document()?;
        assert!(doc.contains("<p>a b c</p>"));
        assert!(doc.contains("<p>line<br/>next</p>"));
        assert!(doc.contains("x &lt; y &amp; z"));
        assert!(doc.contains(r#"alt="a &quot;map&quot;""#));
        assert!(!doc.contains("&nbsp;"));
        assert!(!doc.contains("<br>"));
        assert!(!doc.contains("<!--"));
        Ok(())
    }

    #[test]
    fn missing_chapter_content_names_locator() {
        let pages = FixturePages::default().with(
            "http://royalroadl.com/fiction/chapter/3",
            r#"<div class="fic-header"><h2>Three</h2></div>"#,
        );
        let chapter = Chapter::new(Site::RoyalRoad, "3", &pages);
        match chapter.body() {
            Err(ScraperError::MissingElement { what, locator, .. }) => {
                assert_eq!(what, "chapter content");
                assert_eq!(locator, "3");
            }
            other => panic!("expected MissingElement, got {:?}", other),
        }
    }

    #[test]
    fn empty_discovery_is_an_error() {
        let pages = FixturePages::default().with(
            "http://royalroadl.com/fiction/5",
            r#"<div class="fic-header"><h2>Empty</h2></div><a href="/home">home</a>"#,
        );
        let book = Book::new(Site::RoyalRoad, "5", &pages);
        assert!(matches!(
            book.chapters(),
            Err(ScraperError::EmptyChapterList { .. })
        ));
    }

    #[test]
    fn wuxiaworld_book_resolves_title_author_and_chapters() -> Result<(), ScraperError> {
        let chapter_url = "http://www.wuxiaworld.com/desolate-era-index/de-book-1-chapter-1/";
        let pages = FixturePages::default()
            .with(
                "http://www.wuxiaworld.com/desolate-era-index",
                r#"<header class="entry-header"><h1>Desolate Era 1034 Chapters Available</h1></header>
<p><a href="/desolate-era-index/de-book-1-chapter-1/">Chapter 1</a>
<a href="/novel-updates/desolate-era-chapter-1-release/">release</a></p>"#,
            )
            .with(
                chapter_url,
                r#"<div class="entry-header"><h1>Book 1, Chapter 1</h1></div><div itemprop="articleBody"><p>Snow fell.</p></div>"#,
            );
        let book = Book::new(Site::WuxiaWorld, "desolate-era-index", &pages);
        assert_eq!(book.title()?, "Desolate Era");
        assert_eq!(book.author()?, "unknown");
        let chapters = book.chapters()?;
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].locator(), chapter_url);
        assert_eq!(chapters[0].url(), chapter_url);
        let doc = chapters[0].document()?;
        assert!(doc.contains("<h2>Book 1, Chapter 1</h2>"));
        assert!(doc.contains(r#"<div itemprop="articleBody"><p>Snow fell.</p></div>"#));
        assert_eq!(pages.requests.borrow().len(), 2);
        Ok(())
    }
}
