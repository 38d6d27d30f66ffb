//! Static article fields: identifier, title, byline, body and figures.
//!
//! The article id is the record's dedup key and file name, so [`post_id`] must
//! be a pure function of the URL. Article paths end in `-{id}.htm`; the id is
//! not reversible into a URL.

use super::frontier::{ARTICLE_SUFFIX, sel};
use crate::error::CrawlError;
use crate::models::Image;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static ID_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap_or_else(|e| panic!("id regex: {e}")));

static TITLE: Lazy<Selector> = Lazy::new(|| sel("h1"));
static PUBLISHED: Lazy<Selector> = Lazy::new(|| sel("meta[property='article:published_time']"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| sel("div.author-info a"));
static BODY: Lazy<Selector> = Lazy::new(|| sel("div.detail-cmain"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| sel("p"));
static FIGURES: Lazy<Selector> = Lazy::new(|| {
    sel("#main-detail > div.detail-cmain.clearfix > div.detail-content.afcbc-body > figure")
});
static FIGURE_IMG: Lazy<Selector> = Lazy::new(|| sel("img"));

/// Embedded widgets whose paragraphs are not article prose.
static EXCLUDED_CONTAINERS: Lazy<Selector> = Lazy::new(|| {
    sel("div[type='RelatedNewsBox'], div[type='RelatedOneNews'], div.VCObjectBoxRelatedNews, \
         div[type='VCObjectBoxQuote'], div.notebox, div.box-related")
});

/// Class marking the teaser paragraph of a related-news card.
const RELATED_SAPO_CLASS: &str = "VCObjectBoxRelatedNewsItemSapo";

/// Paragraph openers used for captions, credits and cross-links.
pub const BOILERPLATE_PREFIXES: &[&str] = &[
    "Ảnh:",
    "Nguồn:",
    "Video:",
    "Xem thêm:",
    "Đọc thêm:",
    "TTO -",
];

/// Derive the article id from its URL: the token after the last `-` of the
/// final path segment, without the `.htm` suffix.
///
/// `https://example.test/a-123.htm` → `123`.
pub fn post_id(url: &str) -> Result<String, CrawlError> {
    let parsed = Url::parse(url).map_err(|e| CrawlError::Url(url.to_string(), e))?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let stem = segment.strip_suffix(ARTICLE_SUFFIX).unwrap_or(segment);
    let id = stem.rsplit('-').next().unwrap_or_default();

    if ID_SHAPE.is_match(id) {
        Ok(id.to_string())
    } else {
        Err(CrawlError::ArticleId(url.to_string()))
    }
}

/// Fields read from the article's server-rendered HTML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticFields {
    pub title: String,
    pub date: Option<String>,
    pub author: Option<String>,
    pub content: Vec<String>,
    pub images: Vec<Image>,
}

fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the static fields. Missing nodes leave the field empty.
pub fn parse_static(html: &str) -> StaticFields {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(clean_text)
        .unwrap_or_default();
    let date = document
        .select(&PUBLISHED)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string);
    let author = document
        .select(&AUTHOR)
        .next()
        .map(clean_text)
        .filter(|a| !a.is_empty());

    StaticFields {
        title,
        date,
        author,
        content: body_paragraphs(&document),
        images: figure_images(&document),
    }
}

fn is_prose(p: ElementRef<'_>) -> bool {
    let el = p.value();
    if el.attr("data-placeholder").is_some() || el.classes().any(|c| c == RELATED_SAPO_CLASS) {
        return false;
    }
    !p.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| EXCLUDED_CONTAINERS.matches(&ancestor))
}

/// Body paragraphs in document order, boilerplate removed.
pub fn body_paragraphs(document: &Html) -> Vec<String> {
    let Some(body) = document.select(&BODY).next() else {
        return Vec::new();
    };
    body.select(&PARAGRAPH)
        .filter(|p| is_prose(*p))
        .map(clean_text)
        .filter(|text| !text.is_empty())
        .filter(|text| !BOILERPLATE_PREFIXES.iter().any(|b| text.starts_with(b)))
        .collect()
}

/// Figure images; lazy-loaded `data-original` wins over `src`.
pub fn figure_images(document: &Html) -> Vec<Image> {
    document
        .select(&FIGURES)
        .filter_map(|figure| figure.select(&FIGURE_IMG).next())
        .filter_map(|img| {
            let el = img.value();
            let url = el
                .attr("data-original")
                .or_else(|| el.attr("src"))
                .filter(|u| !u.is_empty())?;
            let caption = el
                .attr("alt")
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            Some(Image {
                url: url.to_string(),
                caption,
                local_path: None,
            })
        })
        .collect()
}
