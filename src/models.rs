//! Data models for categories, persisted article records and comment threads.
//!
//! This module defines the structures that cross the crawler's boundaries:
//! - [`Category`] / [`Categories`]: the category configuration artifact
//! - [`ArticleRecord`]: one persisted article, written as `{postId}.json`
//! - [`Comment`]: a node of the recursive comment tree
//! - [`Image`], [`Audio`]: media references, with `local_path` set once downloaded
//! - [`Reaction`], [`VoteReactions`]: fixed sets of named counters
//!
//! Field names on the wire follow the established record layout (`postId`,
//! `audio_podcast`, `commentId`, ...) so previously persisted files keep
//! indexing correctly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Category configuration artifact: category name to its listing and discovered articles.
pub type Categories = BTreeMap<String, Category>;

/// A site section whose landing page lists articles.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Category {
    /// Landing page URL.
    pub url: String,
    /// RSS feed URL for the section.
    #[serde(default)]
    pub rss: String,
    /// Discovered article URLs, append-only.
    #[serde(default)]
    pub articles: Vec<String>,
    /// Section carries no article pages (video feeds); never extracted.
    #[serde(default)]
    pub media_only: bool,
}

impl Category {
    /// Append URLs not already listed, keeping existing order. Returns how many were added.
    pub fn merge_articles<I>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.articles.len();
        let mut seen: std::collections::HashSet<String> = self.articles.iter().cloned().collect();
        for url in urls {
            if seen.insert(url.clone()) {
                self.articles.push(url);
            }
        }
        self.articles.len() - before
    }
}

/// One fully extracted article as persisted on disk.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    #[serde(rename = "postId")]
    pub post_id: String,
    pub category: String,
    pub url: String,
    pub title: String,
    /// Body paragraphs in document order.
    pub content: Vec<String>,
    pub author: String,
    /// Publish timestamp as published by the site.
    pub date: Option<String>,
    #[serde(rename = "audio_podcast", default)]
    pub audio: Vec<Audio>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub reactions: Reaction,
    /// Best-effort fields whose extraction failed; their values are defaults, not observations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedField>,
    pub crawled_at: DateTime<Utc>,
}

/// Fields that may fall back to a default when extraction fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedField {
    Comments,
    Audio,
    Reactions,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Image {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Audio {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Article-level engagement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Reaction {
    pub star: u64,
    pub like: u64,
    pub love: u64,
}

/// Per-comment vote tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoteReactions {
    pub like: u64,
    pub love: u64,
    pub wow: u64,
    pub sad: u64,
    pub angry: u64,
}

impl VoteReactions {
    /// Record `count` votes for a numeric reaction code. Unknown codes are ignored.
    pub fn add_code(&mut self, code: &str, count: u64) {
        let slot = match code {
            "1" => &mut self.like,
            "3" => &mut self.love,
            "5" => &mut self.wow,
            "7" => &mut self.sad,
            "9" => &mut self.angry,
            _ => return,
        };
        *slot = count;
    }
}

/// A comment and its replies. Children are owned by exactly one parent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Comment {
    #[serde(rename = "commentId", default, deserialize_with = "id_from_any")]
    pub comment_id: String,
    pub author: Option<String>,
    pub text: Option<String>,
    pub date: Option<String>,
    #[serde(default)]
    pub vote_reactions: VoteReactions,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

/// Text form of an identifier that may arrive as a string, a number or null.
pub(crate) fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Older records stored comment ids as JSON numbers.
fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(|value| id_text(&value))
}

/// Count comments and the deepest nesting level in a forest of comments.
///
/// A comment without replies has depth 1. An empty forest yields `(0, 0)`.
pub fn comment_tree_stats(comments: &[Comment]) -> (usize, usize) {
    comments.iter().fold((0, 0), |(total, depth), comment| {
        let (child_total, child_depth) = comment_tree_stats(&comment.replies);
        (total + 1 + child_total, depth.max(1 + child_depth))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> Comment {
        Comment {
            comment_id: id.to_string(),
            author: None,
            text: None,
            date: None,
            vote_reactions: VoteReactions::default(),
            replies: vec![],
        }
    }

    fn with_replies(id: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            replies,
            ..leaf(id)
        }
    }

    #[test]
    fn test_stats_flat_list() {
        let comments: Vec<Comment> = (0..5).map(|i| leaf(&i.to_string())).collect();
        assert_eq!(comment_tree_stats(&comments), (5, 1));
    }

    #[test]
    fn test_stats_chain() {
        let chain = with_replies("1", vec![with_replies("2", vec![leaf("3")])]);
        assert_eq!(comment_tree_stats(&[chain]), (3, 3));
    }

    #[test]
    fn test_stats_mixed_branching() {
        let tree = vec![
            with_replies("a", vec![leaf("a1"), with_replies("a2", vec![leaf("a2x")])]),
            leaf("b"),
        ];
        assert_eq!(comment_tree_stats(&tree), (5, 3));
        assert_eq!(comment_tree_stats(&[]), (0, 0));
    }

    #[test]
    fn test_vote_codes() {
        let mut votes = VoteReactions::default();
        votes.add_code("1", 4);
        votes.add_code("9", 2);
        votes.add_code("42", 100);
        assert_eq!(
            votes,
            VoteReactions {
                like: 4,
                angry: 2,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_merge_articles_appends_only_new() {
        let mut category = Category {
            url: "https://example.test/tech.htm".into(),
            articles: vec!["https://example.test/a-1.htm".into()],
            ..Default::default()
        };
        let added = category.merge_articles(vec![
            "https://example.test/a-2.htm".to_string(),
            "https://example.test/a-1.htm".to_string(),
        ]);
        assert_eq!(added, 1);
        assert_eq!(
            category.articles,
            vec!["https://example.test/a-1.htm", "https://example.test/a-2.htm"]
        );
    }

    #[test]
    fn test_record_wire_names() {
        let record = ArticleRecord {
            post_id: "123".into(),
            category: "Tech".into(),
            url: "https://example.test/a-123.htm".into(),
            title: "Xin chào".into(),
            content: vec!["Đoạn một".into()],
            author: "Tuoi Tre".into(),
            date: None,
            audio: vec![],
            images: vec![],
            comments: vec![],
            reactions: Reaction::default(),
            degraded: vec![],
            crawled_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["postId"], "123");
        assert!(json["audio_podcast"].as_array().unwrap().is_empty());
        assert!(json.get("degraded").is_none());

        let text = serde_json::to_string(&record).unwrap();
        assert!(text.contains("Xin chào"));
        let back: ArticleRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_category_defaults_when_fields_missing() {
        let raw = r#"{"Tech": {"url": "https://example.test/tech.htm", "articles": []}}"#;
        let categories: Categories = serde_json::from_str(raw).unwrap();
        let tech = &categories["Tech"];
        assert!(!tech.media_only);
        assert!(tech.rss.is_empty());
    }

    #[test]
    fn test_comment_id_accepts_numbers() {
        let raw = r#"[
            {"commentId": 7, "author": "An", "text": "hay", "date": null,
             "replies": [{"commentId": "8", "author": null, "text": null, "date": null}]},
            {"commentId": null, "author": null, "text": null, "date": null}
        ]"#;
        let comments: Vec<Comment> = serde_json::from_str(raw).unwrap();
        assert_eq!(comments[0].comment_id, "7");
        assert_eq!(comments[0].replies[0].comment_id, "8");
        assert_eq!(comments[1].comment_id, "");
        assert_eq!(comment_tree_stats(&comments), (3, 2));
    }
}
