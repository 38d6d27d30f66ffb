//! Headless rendering session.
//!
//! Some article fields only exist after page scripts run. They are read through
//! a [`Renderer`], which models a single browser tab: one navigation at a time.
//! The session is opened once per run, shared by all workers through a
//! [`RenderLane`] (an async mutex), and closed explicitly when the run ends.

use crate::error::CrawlError;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Text and one attribute of a matched element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSnapshot {
    pub attribute: Option<String>,
    pub text: String,
}

/// Opaque page-rendering capability.
pub trait Renderer {
    /// Load `url` in the session's tab.
    async fn navigate(&mut self, url: &str) -> Result<(), CrawlError>;

    /// Wait until `selector` matches, or fail with [`CrawlError::Timeout`].
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), CrawlError>;

    /// Snapshot every element matching `selector`, reading `attribute` when given.
    async fn query_all(
        &mut self,
        selector: &str,
        attribute: Option<&str>,
    ) -> Result<Vec<NodeSnapshot>, CrawlError>;

    /// Release the session.
    async fn close(self) -> Result<(), CrawlError>
    where
        Self: Sized;
}

/// Serialized access to the run's single render session.
#[derive(Debug)]
pub struct RenderLane<R> {
    session: Mutex<R>,
}

impl<R: Renderer> RenderLane<R> {
    pub fn new(session: R) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Hold the tab for a sequence of navigation and queries.
    pub async fn acquire(&self) -> MutexGuard<'_, R> {
        self.session.lock().await
    }

    /// Take the session back out, for closing.
    pub fn into_inner(self) -> R {
        self.session.into_inner()
    }
}

/// Stand-in used when the crate is built without a browser: every call fails,
/// so dynamic fields degrade to defaults.
#[derive(Debug, Default)]
#[cfg_attr(feature = "browser", allow(dead_code))]
pub struct NoRenderer;

impl Renderer for NoRenderer {
    async fn navigate(&mut self, _url: &str) -> Result<(), CrawlError> {
        Err(CrawlError::Render("built without the `browser` feature".into()))
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<(), CrawlError> {
        Err(CrawlError::Render(format!("cannot wait for {selector}: no browser")))
    }

    async fn query_all(
        &mut self,
        selector: &str,
        _attribute: Option<&str>,
    ) -> Result<Vec<NodeSnapshot>, CrawlError> {
        Err(CrawlError::Render(format!("cannot query {selector}: no browser")))
    }

    async fn close(self) -> Result<(), CrawlError> {
        Ok(())
    }
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumSession;

#[cfg(feature = "browser")]
mod chromium {
    use super::{NodeSnapshot, Renderer};
    use crate::error::CrawlError;
    use chromiumoxide::error::CdpError;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use std::time::{Duration, Instant};
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};
    use tracing::{debug, info, instrument, warn};

    const POLL_INTERVAL: Duration = Duration::from_millis(250);

    fn classify(e: CdpError) -> CrawlError {
        match e {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) => {
                CrawlError::SessionClosed(e.to_string())
            }
            other => CrawlError::Render(other.to_string()),
        }
    }

    /// One Chromium process with one tab, driven over CDP.
    pub struct ChromiumSession {
        browser: Browser,
        page: Page,
        handler: JoinHandle<()>,
        navigation_timeout: Duration,
    }

    impl ChromiumSession {
        #[instrument(level = "info")]
        pub async fn launch(
            headless: bool,
            navigation_timeout: Duration,
        ) -> Result<Self, CrawlError> {
            let mut builder = BrowserConfig::builder();
            // with_head means NOT headless
            if !headless {
                builder = builder.with_head();
            }
            let config = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--no-sandbox")
                .arg("--disable-gpu")
                .build()
                .map_err(CrawlError::Render)?;

            let (browser, mut handler) = Browser::launch(config).await.map_err(classify)?;
            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let page = browser.new_page("about:blank").await.map_err(classify)?;
            info!("Render session started");
            Ok(Self {
                browser,
                page,
                handler,
                navigation_timeout,
            })
        }
    }

    impl Renderer for ChromiumSession {
        #[instrument(level = "debug", skip(self))]
        async fn navigate(&mut self, url: &str) -> Result<(), CrawlError> {
            match timeout(self.navigation_timeout, self.page.goto(url)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(classify(e)),
                Err(_) => Err(CrawlError::Timeout(format!("navigation to {url}"))),
            }
        }

        async fn wait_for(&mut self, selector: &str, limit: Duration) -> Result<(), CrawlError> {
            let started = Instant::now();
            loop {
                match self.page.find_element(selector).await {
                    Ok(_) => return Ok(()),
                    Err(e @ (CdpError::Ws(_) | CdpError::ChannelSendError(_))) => {
                        return Err(classify(e));
                    }
                    Err(e) => debug!(selector, error = %e, "Selector not present yet"),
                }
                if started.elapsed() >= limit {
                    return Err(CrawlError::Timeout(selector.to_string()));
                }
                sleep(POLL_INTERVAL).await;
            }
        }

        async fn query_all(
            &mut self,
            selector: &str,
            attribute: Option<&str>,
        ) -> Result<Vec<NodeSnapshot>, CrawlError> {
            let elements = self.page.find_elements(selector).await.map_err(classify)?;
            let mut snapshots = Vec::with_capacity(elements.len());
            for element in elements {
                let attribute = match attribute {
                    Some(name) => element.attribute(name).await.map_err(classify)?,
                    None => None,
                };
                let text = element
                    .inner_text()
                    .await
                    .map_err(classify)?
                    .unwrap_or_default();
                snapshots.push(NodeSnapshot { attribute, text });
            }
            Ok(snapshots)
        }

        async fn close(mut self) -> Result<(), CrawlError> {
            if let Err(e) = self.page.close().await {
                warn!(error = %e, "Closing tab failed");
            }
            let closed = self.browser.close().await.map_err(classify);
            let _ = self.browser.wait().await;
            self.handler.abort();
            info!("Render session closed");
            closed.map(|_| ())
        }
    }
}
