//! Optional config file loading. Search order: ./wnscrape.toml, then
//! $XDG_CONFIG_HOME/wnscrape/config.toml (or ~/.config/wnscrape/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory the EPUB is written to. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// When set, the finished EPUB is moved into this directory.
    pub publish_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Stylesheet file embedded in every book instead of the built-in one.
    pub stylesheet: Option<PathBuf>,
}

/// Search order: (1) ./wnscrape.toml, (2) $XDG_CONFIG_HOME/wnscrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("wnscrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("wnscrape").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            return load_config_file(path).map(Some);
        }
    }
    Ok(None)
}

fn load_config_file(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    let config: Config =
        toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.publish_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.stylesheet.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "out"
            publish_dir = "/home/reader/Dropbox/Books"
            user_agent = "Custom/1.0"
            timeout_secs = 60
            stylesheet = "royal_road.css"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(Path::new("out")));
        assert_eq!(
            c.publish_dir.as_deref(),
            Some(Path::new("/home/reader/Dropbox/Books"))
        );
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.stylesheet.as_deref(), Some(Path::new("royal_road.css")));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
    }

    #[test]
    fn load_config_file_reports_path_on_error() {
        let path = std::env::temp_dir().join("wnscrape_config_invalid.toml");
        std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(err.contains("Invalid config"));
        assert!(err.contains("wnscrape_config_invalid.toml"));
        std::fs::remove_file(&path).ok();
    }
}
