//! Reading persisted records back.
//!
//! The output directory is the only record of completed work. Each pass
//! rebuilds the finished-URL set from it with [`finished_urls`]; nothing is
//! cached between passes. Files written by older versions may hold a list of
//! records instead of one, so both layouts are accepted.

use crate::error::CrawlError;
use crate::models::{Comment, comment_tree_stats};
use crate::utils::looks_truncated;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Paths of every `*.json` file directly inside `dir`, sorted.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, CrawlError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CrawlError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(error = %e, "Unreadable directory entry; skipping");
                None
            }
        })
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse one file, logging and returning `None` when it cannot be used.
fn read_json(path: &Path) -> Option<Value> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable record file; skipping");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) if looks_truncated(&e) => {
            warn!(path = %path.display(), error = %e, "Truncated record file; skipping");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid JSON; skipping");
            None
        }
    }
}

/// Record objects in a file: the object itself, or each object of a legacy list.
fn records(value: &Value) -> Vec<&serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

/// Rebuild the set of article URLs that already have a persisted record.
///
/// Unreadable files are skipped (their articles will be crawled again); an
/// unreadable directory is an error.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub fn finished_urls(dir: &Path) -> Result<HashSet<String>, CrawlError> {
    let mut urls = HashSet::new();
    for path in json_files(dir)? {
        let Some(value) = read_json(&path) else {
            continue;
        };
        for record in records(&value) {
            if let Some(url) = record.get("url").and_then(Value::as_str) {
                urls.insert(url.to_string());
            }
        }
    }
    info!(count = urls.len(), "Found finished articles");
    Ok(urls)
}

/// A persisted article with a large comment thread.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentReportRow {
    pub total: usize,
    pub depth: usize,
    pub category: String,
    pub url: String,
}

/// Persisted articles with more than `threshold` comments, busiest first.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), threshold))]
pub fn comment_report(dir: &Path, threshold: usize) -> Result<Vec<CommentReportRow>, CrawlError> {
    let mut rows = Vec::new();
    for path in json_files(dir)? {
        let Some(value) = read_json(&path) else {
            continue;
        };
        for record in records(&value) {
            let Some(comments) = record.get("comments") else {
                continue;
            };
            let comments: Vec<Comment> = match serde_json::from_value(comments.clone()) {
                Ok(comments) => comments,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable comments; skipping");
                    continue;
                }
            };
            let (total, depth) = comment_tree_stats(&comments);
            if total > threshold {
                let field = |name: &str, fallback: &str| {
                    record
                        .get(name)
                        .and_then(Value::as_str)
                        .unwrap_or(fallback)
                        .to_string()
                };
                rows.push(CommentReportRow {
                    total,
                    depth,
                    category: field("category", "UNKNOWN_CATEGORY"),
                    url: field("url", "UNKNOWN_URL"),
                });
            }
        }
    }
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.url.cmp(&b.url)));
    info!(matches = rows.len(), "Comment report built");
    Ok(rows)
}
