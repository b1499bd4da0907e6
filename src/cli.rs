//! CLI parsing and orchestration. Picks the site from the locator, builds the book, writes
//! the EPUB, and maps errors to exit codes.

use crate::config::{self, Config};
use crate::epub::{assemble, AssembleOptions, EpubError};
use crate::site::{Book, PageClient, Site};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Epub(#[from] EpubError),
}

impl CliRunError {
    /// 1: bad input or config. 2: fetch or markup failure. 3: packaging or filesystem failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Epub(EpubError::Book(_))
            | CliRunError::Epub(EpubError::Chapter { .. }) => 2,
            CliRunError::Epub(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "wnscrape", version)]
#[command(about = "Download a Royal Road or Wuxiaworld novel as an EPUB")]
#[command(
    after_help = "A number is read as a Royal Road fiction id; anything else as a Wuxiaworld book path or URL.\nConfig file keys (output_dir, publish_dir, user_agent, timeout_secs, stylesheet) are read from ./wnscrape.toml or ~/.config/wnscrape/config.toml. Set RUST_LOG=debug for request logging."
)]
pub struct Args {
    /// Royal Road fiction id (e.g. 21220) or Wuxiaworld book path (e.g. desolate-era-index).
    pub locator: String,
}

/// Move `path` into `dir`, creating it if needed. Falls back to copy and delete across filesystems.
fn move_into_dir(path: &Path, dir: &Path) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(dir)?;
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "output path has no file name")
    })?;
    let target = dir.join(file_name);
    if std::fs::rename(path, &target).is_err() {
        std::fs::copy(path, &target)?;
        std::fs::remove_file(path)?;
    }
    log::info!("Moved {} to {}", path.display(), target.display());
    Ok(target)
}

fn build_client(config: Option<&Config>) -> Result<PageClient, CliRunError> {
    let mut builder = PageClient::builder();
    if let Some(ua) = config.and_then(|c| c.user_agent.clone()) {
        builder = builder.user_agent(ua);
    }
    if let Some(secs) = config.and_then(|c| c.timeout_secs) {
        builder = builder.timeout_secs(secs);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Ensure output directory exists.
fn validate_output_dir(dir: &Path) -> Result<(), CliRunError> {
    if !dir.as_os_str().is_empty() && !dir.is_dir() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot write output: {}: directory does not exist.",
            dir.display()
        )));
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    if args.locator.trim().is_empty() {
        return Err(CliRunError::InvalidInput(
            "Expected a Royal Road fiction id or a Wuxiaworld book path.".to_string(),
        ));
    }
    let (site, locator) = Site::from_locator(&args.locator);
    log::info!("Using {:?} for locator {}", site, locator);

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let output_dir = config
        .as_ref()
        .and_then(|c| c.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    validate_output_dir(&output_dir)?;
    let publish_dir = config.as_ref().and_then(|c| c.publish_dir.clone());

    let client = build_client(config.as_ref())?;
    let book = Book::new(site, locator, &client);

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n.saturating_sub(1) as u64);
        pb.set_message(format!("Fetching chapter {}/{}", n, total));
    };
    let publish_cb = |path: &Path| match &publish_dir {
        Some(dir) => move_into_dir(path, dir),
        None => Ok(path.to_path_buf()),
    };

    let options = AssembleOptions {
        output_dir,
        stylesheet: config.as_ref().and_then(|c| c.stylesheet.clone()),
        progress: Some(&progress_cb),
        publish: Some(&publish_cb),
    };
    let result = assemble(&book, &options);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    let path = result?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}
