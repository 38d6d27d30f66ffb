//! Runtime configuration.
//!
//! Settings come from three layers: built-in defaults, an optional YAML file
//! (`--config`), and command-line flags, later layers winning. Every delay that
//! rate-limits the source site lives here so it can be tuned but never removed.

use crate::error::CrawlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_BASE_URL: &str = "https://tuoitre.vn";
pub const DEFAULT_COMMENT_API: &str = "https://id.tuoitre.vn/api/getlist-comment.api";
pub const DEFAULT_APP_KEY: &str =
    "lHLShlUMAshjvNkHmBzNqERFZammKUXB1DjEuXKfWAwkunzW6fFbfrhP/FIG0Xwp7aPwhwIuucLW1TVC9lzmUoA==";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Site origin used for category discovery and relative links.
    pub base_url: String,
    pub comment_api_url: String,
    /// Partner key the comment API expects.
    pub comment_app_key: String,
    pub user_agent: String,
    pub accept_language: String,
    /// Author recorded when the byline is missing.
    pub default_author: String,
    /// Articles collected per category.
    pub limit: usize,
    /// Concurrent article workers.
    pub workers: usize,
    pub max_restart: u32,
    pub headless: bool,
    /// Also read each category's RSS feed during discovery.
    pub include_feed: bool,
    pub request_timeout_secs: u64,
    pub asset_timeout_secs: u64,
    pub timeline_delay_ms: u64,
    pub comment_delay_ms: u64,
    pub restart_backoff_ms: u64,
    pub navigation_timeout_secs: u64,
    pub render_settle_ms: u64,
    pub reaction_timeout_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            comment_api_url: DEFAULT_COMMENT_API.to_string(),
            comment_app_key: DEFAULT_APP_KEY.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "vi-VN,vi;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            default_author: "Tuoi Tre".to_string(),
            limit: 100,
            workers: 4,
            max_restart: 3,
            headless: false,
            include_feed: false,
            request_timeout_secs: 15,
            asset_timeout_secs: 15,
            timeline_delay_ms: 1500,
            comment_delay_ms: 1000,
            restart_backoff_ms: 3000,
            navigation_timeout_secs: 60,
            render_settle_ms: 5000,
            reaction_timeout_ms: 10_000,
        }
    }
}

impl CrawlConfig {
    /// Load a YAML config file; missing keys keep their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, CrawlError> {
        let raw = std::fs::read_to_string(path)?;
        let config: CrawlConfig = serde_yaml::from_str(&raw)?;
        info!("Loaded configuration file");
        Ok(config)
    }

    pub fn timeline_delay(&self) -> Duration {
        Duration::from_millis(self.timeline_delay_ms)
    }

    pub fn comment_delay(&self) -> Duration {
        Duration::from_millis(self.comment_delay_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_millis(self.render_settle_ms)
    }

    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_millis(self.reaction_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Where records, media and the failure ledger live.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn record_path(&self, post_id: &str) -> PathBuf {
        self.data_dir.join(format!("{post_id}.json"))
    }

    pub fn image_dir(&self, post_id: &str) -> PathBuf {
        self.data_dir.join("images").join(post_id)
    }

    pub fn audio_dir(&self, post_id: &str) -> PathBuf {
        self.data_dir.join("audio").join(post_id)
    }

    pub fn failure_ledger(&self) -> PathBuf {
        self.data_dir.join("logs").join("failed_urls.txt")
    }

    pub fn default_categories_path(&self) -> PathBuf {
        self.data_dir.join("categories.json")
    }
}
