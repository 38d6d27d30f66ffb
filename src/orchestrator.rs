//! The restartable crawl loop.
//!
//! The loop is a reconciliation against the output directory:
//!
//! | Step | Action |
//! |------|--------|
//! | 1 | Rebuild the finished-URL set from persisted records |
//! | 2 | `remaining = targets - finished`; empty means done |
//! | 3 | Stop when every attempt is spent |
//! | 4 | Run one pass over the remaining URLs, then back off |
//!
//! A pass that crashes (render session lost, records cannot be written) still
//! consumes an attempt, so at most `max_restart + 1` passes run. Because
//! completion is read back from disk, a killed process resumes where it
//! stopped on the next invocation.

use crate::assets::{fetch_audio, fetch_images};
use crate::config::{CrawlConfig, DataLayout};
use crate::error::CrawlError;
use crate::models::Categories;
use crate::outputs::indexes::finished_urls;
use crate::outputs::json::write_record;
use crate::outputs::ledger::FailureLedger;
use crate::pipeline::Extractor;
use crate::render::Renderer;
use crate::scrapers::Fetch;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Articles processed concurrently within a category.
    pub workers: usize,
    pub max_restart: u32,
    pub restart_backoff: Duration,
}

impl RunOptions {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_restart: config.max_restart,
            restart_backoff: config.restart_backoff(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every target has a persisted record.
    Done { passes: u32 },
    /// Attempts ran out with `remaining` targets unfinished.
    Exhausted { remaining: usize },
}

/// Counters for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub attempted: usize,
    pub saved: usize,
    pub failed: usize,
}

/// One category's article URLs, in discovery order.
#[derive(Debug, Clone)]
struct Queue {
    category: String,
    urls: Vec<String>,
}

/// Article URLs to crawl, per category. Media-only categories are skipped and
/// a URL listed under several categories is kept under the first one.
fn targets(categories: &Categories) -> Vec<Queue> {
    let mut seen: HashSet<&String> = HashSet::new();
    categories
        .iter()
        .filter(|(_, category)| !category.media_only)
        .map(|(name, category)| Queue {
            category: name.clone(),
            urls: category
                .articles
                .iter()
                .unique()
                .filter(|url| seen.insert(*url))
                .cloned()
                .collect(),
        })
        .collect()
}

pub struct Orchestrator<F, R> {
    extractor: Extractor<F, R>,
    layout: DataLayout,
    ledger: FailureLedger,
    options: RunOptions,
}

impl<F: Fetch, R: Renderer> Orchestrator<F, R> {
    pub fn new(
        extractor: Extractor<F, R>,
        layout: DataLayout,
        ledger: FailureLedger,
        options: RunOptions,
    ) -> Self {
        Self {
            extractor,
            layout,
            ledger,
            options,
        }
    }

    /// Run the loop, then close the render session whatever the outcome.
    pub async fn run_and_close(self, categories: &Categories) -> RunOutcome {
        let outcome = self.run(categories).await;
        if let Err(e) = self.extractor.into_renderer().close().await {
            warn!(error = %e, "Closing the render session failed");
        }
        outcome
    }

    /// Reconcile the output directory with `categories` until done or out of attempts.
    #[instrument(level = "info", skip_all, fields(max_restart = self.options.max_restart))]
    pub async fn run(&self, categories: &Categories) -> RunOutcome {
        let queues = targets(categories);
        let total: usize = queues.iter().map(|q| q.urls.len()).sum();
        info!(categories = queues.len(), targets = total, "Crawl starting");

        let mut passes = 0u32;
        let mut remaining = total;
        loop {
            let finished = match finished_urls(&self.layout.data_dir) {
                Ok(finished) => {
                    remaining = queues
                        .iter()
                        .flat_map(|q| &q.urls)
                        .filter(|url| !finished.contains(*url))
                        .count();
                    if remaining == 0 {
                        info!(passes, "All targets persisted");
                        return RunOutcome::Done { passes };
                    }
                    Some(finished)
                }
                Err(e) => {
                    error!(error = %e, "Cannot rebuild the finished set");
                    None
                }
            };

            if passes > self.options.max_restart {
                warn!(passes, remaining, "Restart attempts exhausted");
                return RunOutcome::Exhausted { remaining };
            }
            passes += 1;

            let clean = match finished {
                Some(finished) => {
                    info!(pass = passes, remaining, "Pass starting");
                    match self.run_pass(&queues, &finished).await {
                        Ok(stats) => {
                            info!(
                                pass = passes,
                                attempted = stats.attempted,
                                saved = stats.saved,
                                failed = stats.failed,
                                "Pass finished"
                            );
                            stats.failed == 0
                        }
                        Err(e) => {
                            error!(pass = passes, error = %e, "Pass aborted");
                            false
                        }
                    }
                }
                None => false,
            };

            if !clean {
                sleep(self.options.restart_backoff).await;
            }
        }
    }

    /// One pass over every unfinished URL.
    ///
    /// Per-URL failures go to the ledger and the pass continues; a pass-fatal
    /// error stops it.
    async fn run_pass(
        &self,
        queues: &[Queue],
        finished: &HashSet<String>,
    ) -> Result<PassStats, CrawlError> {
        let mut stats = PassStats::default();
        for queue in queues {
            let pending: Vec<&String> = queue
                .urls
                .iter()
                .filter(|url| !finished.contains(*url))
                .collect();
            if pending.is_empty() {
                continue;
            }
            info!(category = %queue.category, pending = pending.len(), "Crawling category");

            let mut results = stream::iter(pending)
                .map(|url| async move { (url, self.process(url, &queue.category).await) })
                .buffer_unordered(self.options.workers);

            while let Some((url, result)) = results.next().await {
                stats.attempted += 1;
                match result {
                    Ok(_) => stats.saved += 1,
                    Err(e) if e.is_pass_fatal() => {
                        error!(%url, error = %e, "Pass-level failure");
                        return Err(e);
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!(%url, error = %e, "Article failed");
                        self.ledger.record(url, &e).await;
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Extract, download media and persist one article.
    async fn process(&self, url: &str, category: &str) -> Result<PathBuf, CrawlError> {
        let mut record = self.extractor.extract(url, category).await?;
        let fetcher = self.extractor.fetcher();
        let images = std::mem::take(&mut record.images);
        record.images = fetch_images(fetcher, &self.layout, &record.post_id, images).await;
        let audio = std::mem::take(&mut record.audio);
        record.audio = fetch_audio(fetcher, &self.layout, &record.post_id, audio).await;
        write_record(&self.layout, &record).await
    }
}
