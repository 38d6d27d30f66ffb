//! Source-site access and parsing.
//!
//! Everything that talks to the news site over plain HTTP goes through the
//! [`Fetch`] trait so discovery, extraction and asset downloads can run against
//! in-memory fixtures in tests. [`HttpClient`] is the production implementation.
//!
//! # Submodules
//!
//! | Module | Role |
//! |--------|------|
//! | [`frontier`] | Category menu and article URL discovery, including timeline pagination |
//! | [`article`] | Article identifier and static HTML fields |
//! | [`comments`] | Paginated comment API walk producing the comment tree |
//! | [`dynamic`] | Audio sources and reaction counters read through the render session |
//!
//! # TLS
//!
//! The source serves an incomplete certificate chain, so [`HttpClient`] disables
//! certificate verification. This is a deliberate trust downgrade: responses
//! from the site are not authenticated. Nothing secret is ever sent.

pub mod article;
pub mod comments;
pub mod dynamic;
pub mod frontier;

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Header profile for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// HTML pages: listings, timeline pages, articles.
    Page,
    /// JSON endpoints such as the comment API.
    Api,
}

/// Plain HTTP access to the source site.
pub trait Fetch {
    /// GET `url` and return the body. Non-2xx statuses are errors.
    async fn fetch_text(&self, url: &str, kind: RequestKind) -> Result<String, CrawlError>;

    /// GET `url` and return the raw bytes (media downloads).
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, CrawlError>;
}

/// reqwest-backed [`Fetch`] with browser-like headers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    referer: String,
    origin: String,
    asset_timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let origin = config.base_url.trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            // Trust downgrade: the site's chain does not validate. See module docs.
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| CrawlError::Http {
                url: origin.clone(),
                source: e,
            })?;

        warn!("TLS certificate verification is disabled for the source site");
        Ok(Self {
            client,
            referer: format!("{origin}/"),
            origin,
            asset_timeout: Duration::from_secs(config.asset_timeout_secs),
        })
    }

    async fn get(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, CrawlError> {
        let response = request.send().await.map_err(|e| CrawlError::Http {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Fetch for HttpClient {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_text(&self, url: &str, kind: RequestKind) -> Result<String, CrawlError> {
        let accept = match kind {
            RequestKind::Page => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            RequestKind::Api => "application/json, text/plain, */*",
        };
        let request = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(REFERER, &self.referer)
            .header(ORIGIN, &self.origin);

        let body = self
            .get(request, url)
            .await?
            .text()
            .await
            .map_err(|e| CrawlError::Http {
                url: url.to_string(),
                source: e,
            })?;
        debug!(bytes = body.len(), "Fetched");
        Ok(body)
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, CrawlError> {
        let request = self
            .client
            .get(url)
            .header(REFERER, &self.referer)
            .timeout(self.asset_timeout);
        let bytes = self
            .get(request, url)
            .await?
            .bytes()
            .await
            .map_err(|e| CrawlError::Http {
                url: url.to_string(),
                source: e,
            })?;
        Ok(bytes.to_vec())
    }
}
