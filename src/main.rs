//! # Article Harvest
//!
//! A resumable crawler that archives news articles as JSON records, together
//! with their images, audio tracks, comment threads and reaction counters.
//!
//! ## Usage
//!
//! ```sh
//! article_harvest --data-dir ./data --limit 50 --headless
//! ```
//!
//! ## Architecture
//!
//! The application runs in four stages:
//! 1. **Categories**: read the category file, or discover categories from the
//!    site menu
//! 2. **Discovery**: collect article URLs per category (landing page regions,
//!    timeline pagination, optional RSS feed) and save them back
//! 3. **Crawl**: extract, download media and persist each unfinished article,
//!    restarting failed passes a bounded number of times
//! 4. **Shutdown**: release the browser session and report what is left
//!
//! Completed work is whatever sits in the data directory, so rerunning the
//! same command resumes an interrupted crawl.

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod assets;
mod cli;
mod config;
mod error;
mod models;
mod orchestrator;
mod outputs;
mod pipeline;
mod render;
mod scrapers;
mod utils;

use cli::Cli;
use config::{CrawlConfig, DataLayout};
use models::Categories;
use orchestrator::{Orchestrator, RunOptions, RunOutcome};
use outputs::{indexes, json, ledger::FailureLedger};
use pipeline::{ExtractSettings, Extractor};
use render::Renderer;
use scrapers::frontier::{self, DiscoveryOptions};
use scrapers::{Fetch, HttpClient};
use utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("article_harvest starting up");

    let args = Cli::parse();
    debug!(?args.data_dir, ?args.config, "Parsed CLI arguments");

    let mut config = match &args.config {
        Some(path) => CrawlConfig::load(path)?,
        None => CrawlConfig::default(),
    };
    args.apply(&mut config);
    let layout = args.layout();

    // Early check: the data dir must be writable before any network work
    if let Err(e) = ensure_writable_dir(&layout.data_dir).await {
        error!(
            path = %layout.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    if let Some(threshold) = args.comment_report {
        print_comment_report(&layout, threshold)?;
        return Ok(ExitCode::SUCCESS);
    }

    let fetcher = HttpClient::new(&config)?;
    let categories = prepare_categories(&fetcher, &args, &config).await?;

    let outcome = {
        #[cfg(feature = "browser")]
        {
            let session =
                render::ChromiumSession::launch(config.headless, config.navigation_timeout())
                    .await?;
            crawl(fetcher, session, &config, layout, &categories).await?
        }
        #[cfg(not(feature = "browser"))]
        {
            warn!("Built without the `browser` feature; audio and reactions will be degraded");
            crawl(fetcher, render::NoRenderer, &config, layout, &categories).await?
        }
    };

    let elapsed = start_time.elapsed();
    match outcome {
        RunOutcome::Done { passes } => {
            info!(passes, elapsed_secs = elapsed.as_secs(), "Crawl complete");
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Exhausted { remaining } => {
            error!(
                remaining,
                elapsed_secs = elapsed.as_secs(),
                "Crawl stopped with unfinished articles"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Load or discover categories, refresh their article lists and save them.
///
/// The category file always keeps every category; `--categories` only narrows
/// which ones are refreshed here and returned for crawling.
#[instrument(level = "info", skip_all)]
async fn prepare_categories<F: Fetch>(
    fetcher: &F,
    args: &Cli,
    config: &CrawlConfig,
) -> Result<Categories, Box<dyn Error>> {
    let path = args.categories_path();
    let filter = args.category_filter();
    let selected = |name: &str| {
        filter
            .as_ref()
            .is_none_or(|wanted| wanted.iter().any(|w| w == name))
    };

    let mut categories = if path.exists() {
        json::read_categories(&path).await?
    } else {
        info!(path = %path.display(), "No category file; reading the site menu");
        frontier::discover_categories(fetcher, &config.base_url, None).await?
    };
    if let Some(wanted) = &filter {
        for name in wanted.iter().filter(|n| !categories.contains_key(*n)) {
            warn!(category = %name, "Unknown category in filter");
        }
    }

    if args.skip_discovery {
        info!("Skipping discovery; using saved article lists");
    } else {
        let refresh = categories
            .iter_mut()
            .filter(|(name, c)| !c.media_only && selected(name.as_str()));
        for (name, category) in refresh {
            let options = DiscoveryOptions {
                limit: config.limit,
                page_delay: config.timeline_delay(),
                feed_url: (config.include_feed && !category.rss.is_empty())
                    .then(|| category.rss.clone()),
            };
            match frontier::discover(fetcher, &category.url, &options).await {
                Ok(urls) => {
                    let added = category.merge_articles(urls);
                    let total = category.articles.len();
                    info!(category = %name, added, total, "Category refreshed");
                }
                Err(e) => warn!(
                    category = %name,
                    error = %truncate_for_log(&e.to_string(), 300),
                    "Discovery failed; keeping saved articles"
                ),
            }
        }
        json::write_categories(&path, &categories).await?;
    }

    let chosen: Categories = categories
        .into_iter()
        .filter(|(name, _)| selected(name.as_str()))
        .collect();
    info!(selected = chosen.len(), "Categories ready");
    Ok(chosen)
}

/// Run the restart loop with `renderer`, which is closed before returning.
async fn crawl<F: Fetch, R: Renderer>(
    fetcher: F,
    renderer: R,
    config: &CrawlConfig,
    layout: DataLayout,
    categories: &Categories,
) -> Result<RunOutcome, Box<dyn Error>> {
    let ledger = match FailureLedger::open(&layout.failure_ledger()).await {
        Ok(ledger) => ledger,
        Err(e) => {
            if let Err(close_err) = renderer.close().await {
                warn!(error = %close_err, "Closing the render session failed");
            }
            return Err(e.into());
        }
    };
    info!(ledger = %ledger.path().display(), "Failure ledger ready");

    let extractor = Extractor::new(fetcher, renderer, ExtractSettings::from_config(config));
    let options = RunOptions::from_config(config);
    let orchestrator = Orchestrator::new(extractor, layout, ledger, options);
    Ok(orchestrator.run_and_close(categories).await)
}

fn print_comment_report(layout: &DataLayout, threshold: usize) -> Result<(), Box<dyn Error>> {
    let rows = indexes::comment_report(&layout.data_dir, threshold)?;
    println!("Articles with more than {threshold} comments: {}", rows.len());
    for row in rows {
        println!(
            "{:>6} comments  depth {:>2}  [{}]  {}",
            row.total, row.depth, row.category, row.url
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::scrapers::testing::FixtureFetch;

    fn category(slug: &str, articles: &[&str]) -> Category {
        Category {
            url: format!("https://example.test/{slug}.htm"),
            articles: articles.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_filtered_run_keeps_other_categories_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("categories.json");
        let mut saved = Categories::new();
        saved.insert("Tech".into(), category("tech", &["https://example.test/a-1.htm"]));
        saved.insert("Sport".into(), category("sport", &["https://example.test/b-2.htm"]));
        json::write_categories(&path, &saved).await.unwrap();

        let data_dir = tmp.path().to_str().unwrap();
        let args = Cli::parse_from(["article_harvest", "-d", data_dir, "--categories", "Tech"]);
        let config = CrawlConfig {
            timeline_delay_ms: 0,
            ..Default::default()
        };

        let chosen = prepare_categories(&FixtureFetch::new(), &args, &config)
            .await
            .unwrap();
        assert_eq!(chosen.keys().collect::<Vec<_>>(), vec!["Tech"]);

        let on_disk = json::read_categories(&path).await.unwrap();
        assert_eq!(on_disk, saved);
    }

    #[tokio::test]
    async fn test_filtered_discovery_merges_into_full_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("categories.json");
        let mut saved = Categories::new();
        saved.insert("Tech".into(), category("tech", &["https://example.test/a-1.htm"]));
        saved.insert("Sport".into(), category("sport", &["https://example.test/b-2.htm"]));
        json::write_categories(&path, &saved).await.unwrap();

        let fetcher = FixtureFetch::new().page(
            "https://example.test/tech.htm",
            r#"<a class="box-category-link-title" href="/a-3.htm">new</a>"#,
        );
        let data_dir = tmp.path().to_str().unwrap();
        let args = Cli::parse_from(["article_harvest", "-d", data_dir, "--categories", "Tech"]);

        let chosen = prepare_categories(&fetcher, &args, &CrawlConfig::default())
            .await
            .unwrap();
        assert_eq!(
            chosen["Tech"].articles,
            vec!["https://example.test/a-1.htm", "https://example.test/a-3.htm"]
        );
        // Only the selected category is refreshed.
        assert_eq!(fetcher.requested(), vec!["https://example.test/tech.htm"]);

        let on_disk = json::read_categories(&path).await.unwrap();
        assert_eq!(on_disk["Tech"], chosen["Tech"]);
        assert_eq!(on_disk["Sport"], saved["Sport"]);
    }
}
