//! Error taxonomy for the crawler.
//!
//! Most failures are scoped to a single article and end up in the failure
//! ledger. A few mean the whole pass cannot continue (the render session is
//! gone, or the output directory cannot be written); those are reported by
//! [`CrawlError::is_pass_fatal`] and handled by the orchestrator's restart loop.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid url {0}: {1}")]
    Url(String, url::ParseError),

    #[error("cannot derive an article id from {0}")]
    ArticleId(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("render session is no longer available: {0}")]
    SessionClosed(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("cannot read output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Errors that must abort the running pass instead of being charged to one URL.
    pub fn is_pass_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::SessionClosed(_) | CrawlError::OutputDir { .. } | CrawlError::Persist { .. }
        )
    }

    /// Short reason suitable for the failure ledger.
    pub fn ledger_reason(&self) -> String {
        self.to_string().replace(['\n', '\r'], " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_fatal_classification() {
        assert!(CrawlError::SessionClosed("ws dropped".into()).is_pass_fatal());
        assert!(
            CrawlError::Persist {
                path: PathBuf::from("/tmp/x.json"),
                source: std::io::Error::other("disk full"),
            }
            .is_pass_fatal()
        );
        assert!(!CrawlError::Render("no such element".into()).is_pass_fatal());
        assert!(
            !CrawlError::Status {
                url: "https://example.test/a-1.htm".into(),
                status: 404,
            }
            .is_pass_fatal()
        );
    }

    #[test]
    fn test_ledger_reason_is_single_line() {
        let err = CrawlError::Render("line one\nline two".into());
        assert_eq!(err.ledger_reason(), "render error: line one line two");
    }
}
