//! Per-article extraction.
//!
//! Combines the three sources for one URL: the static HTML page, the comment
//! API and the render session. Only the article id and the page fetch are
//! mandatory; comments, audio and reactions degrade to defaults and are listed
//! in [`ArticleRecord::degraded`]. Losing the render session is not degraded:
//! it is returned so the orchestrator can abandon the pass.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::models::{ArticleRecord, DegradedField, Reaction};
use crate::render::{RenderLane, Renderer};
use crate::scrapers::comments::{CommentApi, walk_comments};
use crate::scrapers::{Fetch, RequestKind, article, dynamic};
use chrono::Utc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Knobs for [`Extractor::extract`].
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub comments: CommentApi,
    pub default_author: String,
    pub render_settle: Duration,
    pub reaction_wait: Duration,
}

impl ExtractSettings {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            comments: CommentApi {
                endpoint: config.comment_api_url.clone(),
                app_key: config.comment_app_key.clone(),
                page_delay: config.comment_delay(),
            },
            default_author: config.default_author.clone(),
            render_settle: config.render_settle(),
            reaction_wait: config.reaction_timeout(),
        }
    }
}

/// Owns the HTTP client and the run's render lane.
pub struct Extractor<F, R> {
    fetcher: F,
    lane: RenderLane<R>,
    settings: ExtractSettings,
}

impl<F: Fetch, R: Renderer> Extractor<F, R> {
    pub fn new(fetcher: F, renderer: R, settings: ExtractSettings) -> Self {
        Self {
            fetcher,
            lane: RenderLane::new(renderer),
            settings,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Give the render session back so it can be closed.
    pub fn into_renderer(self) -> R {
        self.lane.into_inner()
    }

    /// Build the record for `url` (before asset download).
    #[instrument(level = "info", skip(self))]
    pub async fn extract(&self, url: &str, category: &str) -> Result<ArticleRecord, CrawlError> {
        let post_id = article::post_id(url)?;
        let html = self.fetcher.fetch_text(url, RequestKind::Page).await?;
        let fields = article::parse_static(&html);
        let mut degraded = Vec::new();

        let walk = walk_comments(&self.fetcher, &self.settings.comments, &post_id).await;
        if !walk.complete {
            degraded.push(DegradedField::Comments);
        }

        let (audio, reactions) = {
            let mut session = self.lane.acquire().await;
            let settle = self.settings.render_settle;
            let audio = match dynamic::read_audio(&mut *session, url, settle).await {
                Ok(audio) => audio,
                Err(e) if e.is_pass_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Audio extraction failed");
                    degraded.push(DegradedField::Audio);
                    Vec::new()
                }
            };
            let wait = self.settings.reaction_wait;
            let reactions = match dynamic::read_reactions(&mut *session, wait).await {
                Ok(reactions) => reactions,
                Err(e) if e.is_pass_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Reaction extraction failed");
                    degraded.push(DegradedField::Reactions);
                    Reaction::default()
                }
            };
            (audio, reactions)
        };

        info!(
            %post_id,
            paragraphs = fields.content.len(),
            images = fields.images.len(),
            comments = walk.comments.len(),
            audio = audio.len(),
            degraded = degraded.len(),
            "Extracted article"
        );

        Ok(ArticleRecord {
            post_id,
            category: category.to_string(),
            url: url.to_string(),
            title: fields.title,
            content: fields.content,
            author: fields
                .author
                .unwrap_or_else(|| self.settings.default_author.clone()),
            date: fields.date,
            audio,
            images: fields.images,
            comments: walk.comments,
            reactions,
            degraded,
            crawled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::ScriptedRenderer;
    use crate::render::NodeSnapshot;
    use crate::scrapers::dynamic::REACTION_CONTAINER;
    use crate::scrapers::testing::FixtureFetch;

    const ARTICLE_URL: &str = "https://example.test/tin-moi-77.htm";

    fn settings() -> ExtractSettings {
        ExtractSettings {
            comments: CommentApi {
                endpoint: "https://api.example.test/comments".into(),
                app_key: "KEY".into(),
                page_delay: Duration::ZERO,
            },
            default_author: "Tuoi Tre".into(),
            render_settle: Duration::ZERO,
            reaction_wait: Duration::ZERO,
        }
    }

    fn comment_page(page: usize, data: &str) -> (String, String) {
        let url = settings().comments.page_url("77", page).unwrap();
        (url, serde_json::json!({ "Data": data }).to_string())
    }

    fn fetcher() -> FixtureFetch {
        let (p1, b1) = comment_page(1, r#"[{"id": 1, "child_comments": [{"id": 2}]}]"#);
        let (p2, b2) = comment_page(2, "[]");
        FixtureFetch::new()
            .page(ARTICLE_URL, "<h1>Tin mới</h1><div class=\"detail-cmain\"><p>Một.</p></div>")
            .page(&p1, &b1)
            .page(&p2, &b2)
    }

    #[tokio::test]
    async fn test_extract_full_record() {
        let renderer = ScriptedRenderer::default()
            .with_nodes(
                "audio",
                vec![NodeSnapshot {
                    attribute: Some("https://cdn.example.test/77.m4a".into()),
                    text: String::new(),
                }],
            )
            .with_present(REACTION_CONTAINER);
        let extractor = Extractor::new(fetcher(), renderer, settings());

        let record = extractor.extract(ARTICLE_URL, "Tech").await.unwrap();
        assert_eq!(record.post_id, "77");
        assert_eq!(record.title, "Tin mới");
        assert_eq!(record.author, "Tuoi Tre");
        assert_eq!(record.content, vec!["Một."]);
        assert_eq!(record.comments.len(), 1);
        assert_eq!(record.comments[0].replies.len(), 1);
        assert_eq!(record.audio.len(), 1);
        assert_eq!(record.reactions, Reaction::default());
        assert!(record.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_failures_degrade() {
        // No reaction bar: reactions are marked degraded rather than reported as zero.
        let extractor = Extractor::new(fetcher(), ScriptedRenderer::default(), settings());
        let record = extractor.extract(ARTICLE_URL, "Tech").await.unwrap();
        assert_eq!(record.degraded, vec![DegradedField::Reactions]);
        assert_eq!(record.reactions, Reaction::default());
    }

    #[tokio::test]
    async fn test_lost_session_is_pass_fatal() {
        let renderer = ScriptedRenderer {
            session_lost: true,
            ..Default::default()
        };
        let extractor = Extractor::new(fetcher(), renderer, settings());
        let err = extractor.extract(ARTICLE_URL, "Tech").await.unwrap_err();
        assert!(err.is_pass_fatal());
    }

    #[tokio::test]
    async fn test_page_fetch_failure_fails_the_url() {
        let extractor =
            Extractor::new(FixtureFetch::new(), ScriptedRenderer::default(), settings());
        let err = extractor.extract(ARTICLE_URL, "Tech").await.unwrap_err();
        assert!(matches!(err, CrawlError::Status { status: 404, .. }));
        assert!(!err.is_pass_fatal());
    }
}
