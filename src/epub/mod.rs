//! EPUB assembler. Fetches every chapter of a [Book], then writes one EPUB 3 package
//! (mimetype, container, OPF, nav, NCX, stylesheet, one document per chapter).

use crate::site::{Book, ScraperError, STYLESHEET_NAME};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";
const TEXT_DIR: &str = "text/";
const RESERVED_FILE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Built-in stylesheet used when no stylesheet file is configured.
pub const DEFAULT_STYLESHEET: &str = r#"body {
  font-family: serif;
  line-height: 1.4;
  margin: 0 5%;
}
h2 {
  text-align: center;
  margin: 1em 0;
}
p {
  text-indent: 1.5em;
  margin: 0.3em 0;
}
"#;

/// Errors from assembling or writing the EPUB.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Could not read book: {0}")]
    Book(#[from] ScraperError),

    /// A chapter could not be fetched or rendered. `index` is 1-based.
    #[error("Chapter {index} ({locator}) failed: {source}")]
    Chapter {
        index: usize,
        locator: String,
        #[source]
        source: ScraperError,
    },

    #[error("Cannot read stylesheet {path}: {source}")]
    Stylesheet {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Callback run on the finished file; returns where the file ended up.
pub type PublishFn<'a> = &'a dyn Fn(&Path) -> Result<PathBuf, std::io::Error>;

/// Options for [assemble].
#[derive(Default)]
pub struct AssembleOptions<'a> {
    /// Directory for `{title}.epub`. Empty means the current directory.
    pub output_dir: PathBuf,
    /// Stylesheet file to embed instead of [DEFAULT_STYLESHEET].
    pub stylesheet: Option<PathBuf>,
    /// Called before each chapter fetch with (1-based chapter, total).
    pub progress: Option<&'a dyn Fn(u32, u32)>,
    pub publish: Option<PublishFn<'a>>,
}

/// Everything the package needs, collected before the output file is opened.
#[derive(Debug)]
struct Package {
    identifier: String,
    title: String,
    author: String,
    stylesheet: String,
    chapters: Vec<ChapterEntry>,
}

#[derive(Debug)]
struct ChapterEntry {
    title: String,
    /// Path under OEBPS/, e.g. `text/good-morning.xhtml`.
    href: String,
    document: String,
}

/// Fetch every chapter of `book` and write `{title}.epub`. Returns the final path
/// (after `publish`, if set).
///
/// All pages are fetched before anything is written, and the archive is written to a
/// `.part` file that is renamed only on success, so a failed run leaves no output behind.
pub fn assemble(book: &Book<'_>, options: &AssembleOptions<'_>) -> Result<PathBuf, EpubError> {
    let stylesheet = match &options.stylesheet {
        Some(path) => std::fs::read_to_string(path).map_err(|e| EpubError::Stylesheet {
            path: path.clone(),
            source: e,
        })?,
        None => DEFAULT_STYLESHEET.to_string(),
    };
    let package = collect_package(book, stylesheet, options.progress)?;

    let file_name = format!("{}.epub", file_name_for_title(&package.title));
    let path = options.output_dir.join(file_name);
    let part = part_path(&path);

    if let Err(e) = write_package(&package, &part) {
        std::fs::remove_file(&part).ok();
        return Err(e);
    }
    std::fs::rename(&part, &path).map_err(|e| {
        std::fs::remove_file(&part).ok();
        EpubError::Rename {
            from: part.clone(),
            to: path.clone(),
            source: e,
        }
    })?;
    log::info!("Wrote {}", path.display());

    match options.publish {
        Some(publish) => publish(&path).map_err(|e| EpubError::Publish {
            path: path.clone(),
            source: e,
        }),
        None => Ok(path),
    }
}

fn collect_package(
    book: &Book<'_>,
    stylesheet: String,
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<Package, EpubError> {
    let identifier = book.url();
    let title = book.title()?;
    let author = book.author()?;
    let chapters = book.chapters()?;
    let total = chapters.len() as u32;

    let mut names = ResourceNames::default();
    let mut entries = Vec::with_capacity(chapters.len());
    for (i, chapter) in chapters.iter().enumerate() {
        if let Some(p) = progress {
            p(i as u32 + 1, total);
        }
        let wrap = |source: ScraperError| EpubError::Chapter {
            index: i + 1,
            locator: chapter.locator().to_string(),
            source,
        };
        let document = chapter.document().map_err(wrap)?;
        let chapter_title = chapter.title().map_err(wrap)?;
        let href = format!("{}{}.xhtml", TEXT_DIR, names.claim(&chapter_title));
        entries.push(ChapterEntry {
            title: chapter_title,
            href,
            document,
        });
    }

    Ok(Package {
        identifier,
        title,
        author,
        stylesheet,
        chapters: entries,
    })
}

fn part_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}

fn write_package(package: &Package, path: &Path) -> Result<(), EpubError> {
    let file = File::create(path).map_err(|e| EpubError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);

    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed (required by EPUB)
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(package, &mut zip, options_deflate)?;
    write_nav_xhtml(package, &mut zip, options_deflate)?;
    write_ncx(package, &mut zip, options_deflate)?;

    zip.start_file(format!("{}{}", OEBPS_PREFIX, STYLESHEET_NAME), options_deflate)?;
    zip.write_all(package.stylesheet.as_bytes())?;

    for ch in &package.chapters {
        zip.start_file(format!("{}{}", OEBPS_PREFIX, ch.href), options_deflate)?;
        zip.write_all(ch.document.as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

fn write_opf(
    package: &Package,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut manifest = String::from(
        r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
"#,
    );
    manifest.push_str(&format!(
        "    <item id=\"style\" href=\"{}\" media-type=\"text/css\"/>\n",
        STYLESHEET_NAME
    ));
    let mut spine = String::new();
    for (i, ch) in package.chapters.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"chapter-{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            i + 1,
            xml_escape(&ch.href)
        ));
        spine.push_str(&format!("    <itemref idref=\"chapter-{}\"/>\n", i + 1));
    }

    let opf = format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <meta refines="#book-id" property="identifier-type">url</meta>
    <dc:title>{title}</dc:title>
    <dc:creator id="creator">{creator}</dc:creator>
    <meta refines="#creator" property="role" scheme="marc:relators">aut</meta>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"##,
        id = xml_escape(&package.identifier),
        title = xml_escape(&package.title),
        creator = xml_escape(&package.author),
        manifest = manifest,
        spine = spine,
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_nav_xhtml(
    package: &Package,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_links = String::new();
    for ch in &package.chapters {
        nav_links.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            xml_escape(&ch.href),
            xml_escape(&ch.title)
        ));
    }
    let nav = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
{}    </ol>
  </nav>
</body>
</html>
"#,
        xml_escape(&package.title),
        nav_links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_ncx(
    package: &Package,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_points = String::new();
    for (i, ch) in package.chapters.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{src}"/>
    </navPoint>
"#,
            n = i + 1,
            label = xml_escape(&ch.title),
            src = xml_escape(&ch.href)
        ));
    }
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        xml_escape(&package.identifier),
        xml_escape(&package.title),
        nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Book title as a file name: path separators, reserved and control characters removed.
pub fn file_name_for_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !c.is_control() && !RESERVED_FILE_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "book".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Chapter title as a resource name: lowercase ASCII alphanumerics joined by `-`.
fn slug(title: &str) -> String {
    let mut s = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s = s.trim_matches('-').to_string();
    if s.is_empty() {
        s = "chapter".to_string();
    }
    s
}

/// Hands out unique resource names; a repeated slug gets `-2`, `-3`, ...
#[derive(Debug, Default)]
struct ResourceNames {
    taken: std::collections::HashSet<String>,
}

impl ResourceNames {
    fn claim(&mut self, title: &str) -> String {
        let base = slug(title);
        let mut name = base.clone();
        let mut n = 2;
        while !self.taken.insert(name.clone()) {
            name = format!("{}-{}", base, n);
            n += 1;
        }
        name
    }
}
