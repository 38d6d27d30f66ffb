//! Append-only log of URLs that failed in some pass.
//!
//! One line per failure, `<url> | <reason>`. Entries are never removed: a URL
//! that succeeds later keeps its old line, and the persisted record is what
//! counts as done.

use crate::error::CrawlError;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct FailureLedger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FailureLedger {
    /// Open (or create) the ledger at `path`, creating its folder.
    pub async fn open(path: &Path) -> Result<Self, CrawlError> {
        let persist_err = |source| CrawlError::Persist {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(persist_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(persist_err)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure. Write errors are logged, never raised.
    pub async fn record(&self, url: &str, error: &CrawlError) {
        let line = format!("{url} | {}\n", error.ledger_reason());
        let mut file = self.file.lock().await;
        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        match written {
            Ok(()) => debug!(%url, "Failure recorded"),
            Err(e) => warn!(
                %url,
                ledger = %self.path.display(),
                error = %e,
                "Cannot append to failure ledger"
            ),
        }
    }
}
