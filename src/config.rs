//! Configuration management

use crate::classify::{default_category_rules, default_sport_keywords, CategoryRule};
use crate::epg::NextPolicy;
use crate::fetch::DownloadConfig;
use crate::listing::ListingMode;
use crate::lookup::StreamSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_EPG_URL: &str = "https://www.open-epg.com/generate/56jVbhRGv6.xml.gz";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub epg_url: String,
    pub user_agent: String,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_file: String,
    pub mode: ListingMode,
    pub view_mode: String,
    pub refresh_list: Option<String>,
    pub description_limit: usize,
    pub next_policy: NextPolicy,
    /// Dump the parsed EPG next to the cached feed
    pub snapshot: bool,
    pub categories: Vec<CategoryRule>,
    pub sport_keywords: Vec<String>,
    pub stream_sources: Vec<StreamSource>,
    pub download: DownloadConfig,
    pub lookup_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            epg_url: DEFAULT_EPG_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("output"),
            output_file: "lastminute.json".to_string(),
            mode: ListingMode::Complete,
            view_mode: "51".to_string(),
            refresh_list: Some("10800".to_string()),
            description_limit: 200,
            next_policy: NextPolicy::FirstSeen,
            snapshot: false,
            categories: default_category_rules(),
            sport_keywords: default_sport_keywords(),
            stream_sources: vec![StreamSource {
                resolver: "platin".to_string(),
                url: "https://www.platinsport.com/".to_string(),
            }],
            download: DownloadConfig::default(),
            lookup_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("lastminute-epg");
        path.push("config.json");
        path
    }

    /// Load from the per-user config dir, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path. A missing file means defaults; a broken one
    /// is logged and also means defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                Self::default()
            }
        }
    }

    pub fn raw_epg_gz_path(&self) -> PathBuf {
        self.cache_dir.join("epg_raw.xml.gz")
    }

    pub fn raw_epg_path(&self) -> PathBuf {
        self.cache_dir.join("epg_raw.xml")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.cache_dir.join("epg_snapshot.json")
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/lastminute/config.json"));
        assert_eq!(config.description_limit, 200);
        assert_eq!(config.mode, ListingMode::Complete);
        assert_eq!(config.output_path(), PathBuf::from("output/lastminute.json"));
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "mode": "epg_only", "view_mode": "55" }"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.mode, ListingMode::EpgOnly);
        assert_eq!(config.view_mode, "55");
        assert_eq!(config.refresh_list.as_deref(), Some("10800"));
        assert_eq!(config.stream_sources[0].resolver, "platin");
    }

    #[test]
    fn test_invalid_config_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.view_mode, "51");
    }
}
