//! Comment thread retrieval.
//!
//! The comment API is paginated by `pageindex` and returns top-level comments
//! with their replies embedded, so each page converts into complete subtrees
//! and nothing is stitched across pages. The response is an envelope whose
//! `Data` field is itself a JSON-encoded string.

use super::{Fetch, RequestKind};
use crate::error::CrawlError;
use crate::models::{Comment, VoteReactions, id_text};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Data", default)]
    data: Option<String>,
}

/// A comment as the API returns it.
#[derive(Debug, Deserialize)]
pub struct RawComment {
    #[serde(default)]
    id: Value,
    sender_fullname: Option<String>,
    content: Option<String>,
    published_date: Option<String>,
    #[serde(default)]
    reactions: Option<HashMap<String, Value>>,
    #[serde(default)]
    child_comments: Option<Vec<RawComment>>,
}

impl RawComment {
    /// Convert into a [`Comment`], replies first.
    pub fn into_comment(self) -> Comment {
        let replies = self
            .child_comments
            .unwrap_or_default()
            .into_iter()
            .map(RawComment::into_comment)
            .collect();

        let mut votes = VoteReactions::default();
        for (code, count) in self.reactions.unwrap_or_default() {
            votes.add_code(&code, count_of(&count));
        }

        Comment {
            comment_id: id_text(&self.id),
            author: self.sender_fullname,
            text: self.content,
            date: self.published_date,
            vote_reactions: votes,
            replies,
        }
    }
}

fn count_of(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Decode one API page. An absent or empty `Data` means no comments.
pub fn decode_page(body: &str) -> Result<Vec<RawComment>, CrawlError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    match envelope.data.as_deref().map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(data) => {
            let items: Option<Vec<RawComment>> = serde_json::from_str(data)?;
            Ok(items.unwrap_or_default())
        }
    }
}

/// Where and how to query the comment API.
#[derive(Debug, Clone)]
pub struct CommentApi {
    pub endpoint: String,
    pub app_key: String,
    /// Pause between pages.
    pub page_delay: Duration,
}

impl CommentApi {
    pub(crate) fn page_url(&self, post_id: &str, page: usize) -> Result<String, CrawlError> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|e| CrawlError::Url(self.endpoint.clone(), e))?;
        url.query_pairs_mut()
            .append_pair("pageindex", &page.to_string())
            .append_pair("objId", post_id)
            .append_pair("objType", "1")
            .append_pair("objectpopupid", "")
            .append_pair("sort", "2")
            .append_pair("commentid", "")
            .append_pair("command", "")
            .append_pair("appKey", &self.app_key);
        Ok(url.into())
    }
}

/// Comments gathered for one article.
#[derive(Debug, Default)]
pub struct CommentWalk {
    pub comments: Vec<Comment>,
    /// False when a page request or decode failed and the walk stopped early.
    pub complete: bool,
}

/// Walk every comment page for `post_id`.
///
/// Stops on the first empty page. A failed page stops the walk and keeps what
/// was gathered; there is no retry inside the walk.
#[instrument(level = "info", skip(fetcher, api))]
pub async fn walk_comments<F: Fetch>(fetcher: &F, api: &CommentApi, post_id: &str) -> CommentWalk {
    let mut walk = CommentWalk::default();
    let mut page = 1usize;

    loop {
        let page_result = match api.page_url(post_id, page) {
            Ok(url) => match fetcher.fetch_text(&url, RequestKind::Api).await {
                Ok(body) => decode_page(&body),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let items = match page_result {
            Ok(items) => items,
            Err(CrawlError::Status { status, .. }) => {
                // A non-success status is how the API signals the end for some threads.
                debug!(page, status, "Comment API returned non-success; stopping");
                walk.complete = page > 1;
                break;
            }
            Err(e) => {
                warn!(page, error = %e, "Comment API failed; keeping comments gathered so far");
                break;
            }
        };

        if items.is_empty() {
            walk.complete = true;
            break;
        }
        walk.comments.extend(items.into_iter().map(RawComment::into_comment));
        page += 1;
        sleep(api.page_delay).await;
    }

    debug!(top_level = walk.comments.len(), pages = page, "Comment walk finished");
    walk
}
