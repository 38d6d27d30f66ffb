//! Command-line interface definitions for Article Harvest.
//!
//! Every flag that overlaps with the YAML config overrides it when given;
//! directory and config paths can also come from the environment.

use crate::config::{CrawlConfig, DataLayout};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the crawler.
///
/// # Examples
///
/// ```sh
/// # Crawl every category into ./data
/// article_harvest --data-dir ./data
///
/// # Two categories, 20 articles each, headless browser
/// article_harvest -d ./data --categories "Thời sự,Kinh doanh" --limit 20 --headless
///
/// # List articles with more than 100 comments
/// article_harvest -d ./data --comment-report 100
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding records, media and the failure ledger
    #[arg(short, long, env = "HARVEST_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Category configuration file (defaults to `<data-dir>/categories.json`)
    #[arg(long, env = "HARVEST_CATEGORIES_PATH")]
    pub categories_path: Option<PathBuf>,

    /// Only crawl these categories (comma separated names)
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Articles to collect per category
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Extra passes allowed after the first one
    #[arg(long)]
    pub max_restart: Option<u32>,

    /// Articles processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Site origin to crawl
    #[arg(long)]
    pub base_url: Option<String>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reuse the article lists already in the categories file
    #[arg(long)]
    pub skip_discovery: bool,

    /// Also read each category's RSS feed during discovery
    #[arg(long)]
    pub include_feed: bool,

    /// Print articles with more than this many comments and exit
    #[arg(long, value_name = "THRESHOLD")]
    pub comment_report: Option<usize>,
}

impl Cli {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut CrawlConfig) {
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(max_restart) = self.max_restart {
            config.max_restart = max_restart;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if self.headless {
            config.headless = true;
        }
        if self.include_feed {
            config.include_feed = true;
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    pub fn categories_path(&self) -> PathBuf {
        self.categories_path
            .clone()
            .unwrap_or_else(|| self.layout().default_categories_path())
    }

    /// Category names to keep, or `None` for all of them.
    pub fn category_filter(&self) -> Option<Vec<String>> {
        use itertools::Itertools;
        let names: Vec<String> = self
            .categories
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unique()
            .collect();
        (!names.is_empty()).then_some(names)
    }
}
