//! JSON artifacts: article records and the category configuration.
//!
//! Every write goes to a sibling `*.tmp` file first and is renamed into place,
//! so a crash never leaves a half-written record that the index would take for
//! finished work.
//!
//! ```text
//! data_dir/
//! ├── categories.json
//! ├── 20240115093512345.json
//! └── 20240115101200987.json
//! ```

use crate::config::DataLayout;
use crate::error::CrawlError;
use crate::models::{ArticleRecord, Categories};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty UTF-8 JSON and atomically replace `path`.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CrawlError> {
    let json = serde_json::to_vec_pretty(value)?;
    let persist_err = |source| CrawlError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(persist_err)?;
    }
    let tmp = temp_path(path);
    let result = async {
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(persist_err(e));
    }
    debug!(path = %path.display(), bytes = json.len(), "Wrote JSON");
    Ok(())
}

/// Persist one article as `{postId}.json`.
#[instrument(level = "info", skip_all, fields(post_id = %record.post_id))]
pub async fn write_record(
    layout: &DataLayout,
    record: &ArticleRecord,
) -> Result<PathBuf, CrawlError> {
    let path = layout.record_path(&record.post_id);
    write_json_atomic(&path, record).await?;
    info!(path = %path.display(), "Saved article");
    Ok(path)
}

/// Read the category configuration artifact.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_categories(path: &Path) -> Result<Categories, CrawlError> {
    let raw = fs::read_to_string(path).await?;
    let categories: Categories = serde_json::from_str(&raw)?;
    info!(count = categories.len(), "Loaded categories");
    Ok(categories)
}

/// Rewrite the category configuration artifact.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_categories(path: &Path, categories: &Categories) -> Result<(), CrawlError> {
    write_json_atomic(path, categories).await?;
    info!(count = categories.len(), "Saved categories");
    Ok(())
}
