//! Category and article URL discovery.
//!
//! A category landing page exposes articles in three regions (featured block,
//! sub-listing, main grid). Older articles are reachable only through the
//! timeline endpoint, `/timeline/{id}/trang-{n}.htm`, which has no end marker:
//! it keeps returning the last page. Pagination therefore stops as soon as a
//! page contributes no URL that was not already collected.
//!
//! Every link from every source passes through [`is_valid_article`].

use super::{Fetch, RequestKind};
use crate::error::CrawlError;
use crate::models::{Categories, Category};
use crate::utils::slugify_title;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Path suffix shared by every article page.
pub const ARTICLE_SUFFIX: &str = ".htm";

/// Path fragments of pages that end in `.htm` but are not articles.
pub const DISALLOWED_PATHS: &[&str] = &[
    "/tim-kiem.htm",
    "/print/",
    "/ImageView.aspx",
    "/video.htm",
];

/// Landing path of the video section.
const VIDEO_PATH: &str = "/video.htm";

static FOCUS_CONTAINER: Lazy<Selector> = Lazy::new(|| sel("div.list__focus"));
static FOCUS_LINKS: Lazy<Selector> =
    Lazy::new(|| sel("div.item-first a[href], div.item-related a[href], div.box-sub a[href]"));
static SUB_CONTAINER: Lazy<Selector> = Lazy::new(|| sel("div.list__listing-sub"));
static SUB_LINKS: Lazy<Selector> = Lazy::new(|| sel("div.box-category-item a[href]"));
static MAIN_LINKS: Lazy<Selector> = Lazy::new(|| sel("a.box-category-link-title[href]"));
static TIMELINE_ID: Lazy<Selector> = Lazy::new(|| sel("input#hdZoneId"));
static MENU_LINKS: Lazy<Selector> = Lazy::new(|| sel("ul.menu-nav > li > a.nav-link"));

pub(crate) fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// Is `href` a crawlable article link?
///
/// True iff it is site-relative, ends with [`ARTICLE_SUFFIX`] and contains none
/// of [`DISALLOWED_PATHS`].
pub fn is_valid_article(href: &str) -> bool {
    href.starts_with('/')
        && href.ends_with(ARTICLE_SUFFIX)
        && !DISALLOWED_PATHS.iter().any(|bad| href.contains(bad))
}

fn collect_links<'a>(
    elements: impl Iterator<Item = scraper::ElementRef<'a>>,
    origin: &str,
    out: &mut Vec<String>,
) {
    for a in elements {
        if let Some(href) = a.value().attr("href") {
            if is_valid_article(href) {
                out.push(format!("{origin}{href}"));
            }
        }
    }
}

/// Links from the featured block at the top of a landing page.
pub fn featured_links(document: &Html, origin: &str) -> Vec<String> {
    let mut urls = Vec::new();
    match document.select(&FOCUS_CONTAINER).next() {
        Some(container) => collect_links(container.select(&FOCUS_LINKS), origin, &mut urls),
        None => debug!("Featured block not found"),
    }
    urls
}

/// Links from the secondary listing beside the featured block.
pub fn sub_list_links(document: &Html, origin: &str) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(container) = document.select(&SUB_CONTAINER).next() {
        collect_links(container.select(&SUB_LINKS), origin, &mut urls);
    }
    urls
}

/// Links from the main article grid. Also the only region present on timeline pages.
pub fn main_grid_links(document: &Html, origin: &str) -> Vec<String> {
    let mut urls = Vec::new();
    collect_links(document.select(&MAIN_LINKS), origin, &mut urls);
    urls
}

/// Opaque zone id that parameterizes timeline pages.
pub fn timeline_id(document: &Html) -> Option<String> {
    document
        .select(&TIMELINE_ID)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Article links from an RSS feed, filtered through the same validity predicate.
pub fn feed_links(xml: &str, origin: &str) -> Result<Vec<String>, CrawlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut in_item = false;
    let mut in_link = false;
    let mut link = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => in_item = true,
                b"link" if in_item => {
                    in_link = true;
                    link.clear();
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" => in_item = false,
                b"link" if in_link => {
                    in_link = false;
                    if let Ok(parsed) = Url::parse(link.trim()) {
                        if is_valid_article(parsed.path()) {
                            urls.push(format!("{origin}{}", parsed.path()));
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_link => {
                let raw = String::from_utf8_lossy(&t);
                let text = quick_xml::escape::unescape(&raw)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| raw.into_owned());
                link.push_str(&text);
            }
            Ok(Event::GeneralRef(r)) if in_link => {
                // `&amp;` and friends arrive as their own events, between text runs.
                if let Ok(Some(ch)) = r.resolve_char_ref() {
                    link.push(ch);
                } else {
                    let name = String::from_utf8_lossy(&r);
                    match quick_xml::escape::resolve_predefined_entity(&name) {
                        Some(text) => link.push_str(text),
                        None => {
                            link.push('&');
                            link.push_str(&name);
                            link.push(';');
                        }
                    }
                }
            }
            Ok(Event::CData(c)) if in_link => link.push_str(&String::from_utf8_lossy(&c)),
            Ok(Event::Eof) => break,
            Err(e) => return Err(CrawlError::Feed(e.to_string())),
            _ => {}
        }
    }
    Ok(urls)
}

/// `scheme://host[:port]` of a URL, without trailing slash.
pub fn origin_of(url: &str) -> Result<String, CrawlError> {
    let parsed = Url::parse(url).map_err(|e| CrawlError::Url(url.to_string(), e))?;
    Ok(parsed.origin().ascii_serialization())
}

/// Ordered set: insertion order kept, duplicates dropped.
#[derive(Debug, Default)]
struct Collected {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Collected {
    /// Merge `urls`, returning how many were new.
    fn extend(&mut self, urls: Vec<String>) -> usize {
        let before = self.order.len();
        for url in urls {
            if self.seen.insert(url.clone()) {
                self.order.push(url);
            }
        }
        self.order.len() - before
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn into_limited(mut self, limit: usize) -> Vec<String> {
        self.order.truncate(limit);
        self.order
    }
}

/// Discovery tuning.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub limit: usize,
    /// Pause between timeline pages.
    pub page_delay: Duration,
    /// Feed URL to merge before pagination, if any.
    pub feed_url: Option<String>,
}

/// Collect up to `options.limit` article URLs for one category.
#[instrument(level = "info", skip(fetcher, options), fields(limit = options.limit))]
pub async fn discover<F: Fetch>(
    fetcher: &F,
    category_url: &str,
    options: &DiscoveryOptions,
) -> Result<Vec<String>, CrawlError> {
    if options.limit == 0 {
        return Ok(Vec::new());
    }
    let origin = origin_of(category_url)?;
    let html = fetcher.fetch_text(category_url, RequestKind::Page).await?;

    let mut collected = Collected::default();
    let zone = {
        let document = Html::parse_document(&html);
        collected.extend(featured_links(&document, &origin));
        collected.extend(sub_list_links(&document, &origin));
        collected.extend(main_grid_links(&document, &origin));
        timeline_id(&document)
    };
    debug!(count = collected.len(), "Collected landing page links");

    if let Some(feed_url) = &options.feed_url {
        match fetcher.fetch_text(feed_url, RequestKind::Page).await {
            Ok(xml) => match feed_links(&xml, &origin) {
                Ok(urls) => {
                    let added = collected.extend(urls);
                    debug!(added, "Merged feed links");
                }
                Err(e) => warn!(%feed_url, error = %e, "Feed unreadable; ignoring"),
            },
            Err(e) => warn!(%feed_url, error = %e, "Feed fetch failed; ignoring"),
        }
    }

    let Some(zone) = zone else {
        info!(count = collected.len(), "No timeline id; landing page only");
        return Ok(collected.into_limited(options.limit));
    };

    let mut page = 2usize;
    while collected.len() < options.limit {
        let page_url = format!("{origin}/timeline/{zone}/trang-{page}.htm");
        let html = match fetcher.fetch_text(&page_url, RequestKind::Page).await {
            Ok(html) => html,
            Err(e) => {
                warn!(%page_url, error = %e, "Timeline page failed; stopping pagination");
                break;
            }
        };
        let urls = main_grid_links(&Html::parse_document(&html), &origin);
        let added = collected.extend(urls);
        debug!(page, added, total = collected.len(), "Timeline page merged");

        if added == 0 {
            info!(page, "Timeline page added nothing new; stopping");
            break;
        }
        page += 1;
        sleep(options.page_delay).await;
    }

    info!(count = collected.len().min(options.limit), "Discovered article URLs");
    Ok(collected.into_limited(options.limit))
}

/// Read the site's navigation menu into category entries.
///
/// With a `filter`, only the named categories are kept; names missing from the
/// menu are logged.
#[instrument(level = "info", skip(fetcher, filter))]
pub async fn discover_categories<F: Fetch>(
    fetcher: &F,
    base_url: &str,
    filter: Option<&[String]>,
) -> Result<Categories, CrawlError> {
    let origin = origin_of(base_url)?;
    let html = fetcher.fetch_text(base_url, RequestKind::Page).await?;
    let document = Html::parse_document(&html);

    let mut categories = Categories::new();
    for a in document.select(&MENU_LINKS) {
        let name = a.text().collect::<String>().trim().to_string();
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if name.is_empty() || !href.starts_with('/') || !href.ends_with(ARTICLE_SUFFIX) {
            continue;
        }
        if filter.is_some_and(|wanted| !wanted.contains(&name)) {
            continue;
        }
        let slug = slugify_title(href.trim_start_matches('/').trim_end_matches(ARTICLE_SUFFIX));
        categories.entry(name).or_insert_with(|| Category {
            url: format!("{origin}{href}"),
            rss: format!("{origin}/rss/{slug}.rss"),
            articles: Vec::new(),
            media_only: href == VIDEO_PATH,
        });
    }

    if let Some(wanted) = filter {
        for name in wanted.iter().filter(|n| !categories.contains_key(*n)) {
            warn!(category = %name, "Category not found on the site");
        }
    }
    info!(count = categories.len(), "Discovered categories");
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::FixtureFetch;
    use proptest::prelude::*;

    const ORIGIN: &str = "https://example.test";

    fn options(limit: usize) -> DiscoveryOptions {
        DiscoveryOptions {
            limit,
            page_delay: Duration::ZERO,
            feed_url: None,
        }
    }

    fn grid(paths: &[&str]) -> String {
        paths
            .iter()
            .map(|p| format!(r#"<a class="box-category-link-title" href="{p}">t</a>"#))
            .collect()
    }

    fn landing(zone: Option<&str>) -> String {
        let zone = zone
            .map(|z| format!(r#"<input id="hdZoneId" value="{z}">"#))
            .unwrap_or_default();
        format!(
            r#"<html><body>
            <div class="list__focus">
              <div class="item-first"><a href="/focus-1.htm">f</a></div>
              <div class="item-related"><a href="/tim-kiem.htm">search</a></div>
            </div>
            <div class="list__listing-sub">
              <div class="box-category-item"><a href="/sub-2.htm">s</a></div>
            </div>
            {}
            {zone}
            </body></html>"#,
            grid(&["/main-3.htm", "/print/main-3.htm", "https://other.test/x-9.htm"])
        )
    }

    #[test]
    fn test_validity_examples() {
        assert!(is_valid_article("/thoi-su/bai-viet-2024.htm"));
        assert!(!is_valid_article("thoi-su/bai-viet.htm"));
        assert!(!is_valid_article("/thoi-su/bai-viet.html"));
        assert!(!is_valid_article("/video.htm"));
        assert!(!is_valid_article("/print/bai-viet.htm"));
        assert!(!is_valid_article("/ImageView.aspx?x=1.htm"));
        assert!(!is_valid_article(""));
    }

    proptest! {
        #[test]
        fn prop_validity_predicate(path in "[/a-zA-Z.-]{0,24}(\\.htm)?") {
            let expected = path.starts_with('/')
                && path.ends_with(".htm")
                && !DISALLOWED_PATHS.iter().any(|d| path.contains(d));
            prop_assert_eq!(is_valid_article(&path), expected);
        }

        #[test]
        fn prop_disallowed_fragment_always_rejected(
            prefix in "/[a-z-]{0,10}",
            bad in prop::sample::select(DISALLOWED_PATHS.to_vec()),
            suffix in "[a-z-]{0,10}",
        ) {
            let path = format!("{prefix}{bad}{suffix}.htm");
            prop_assert!(!is_valid_article(&path));
        }
    }

    #[test]
    fn test_landing_strategies_are_filtered() {
        let document = Html::parse_document(&landing(Some("42")));
        assert_eq!(featured_links(&document, ORIGIN), vec!["https://example.test/focus-1.htm"]);
        assert_eq!(sub_list_links(&document, ORIGIN), vec!["https://example.test/sub-2.htm"]);
        assert_eq!(main_grid_links(&document, ORIGIN), vec!["https://example.test/main-3.htm"]);
        assert_eq!(timeline_id(&document).as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_no_timeline_id_returns_landing_only() {
        let fetcher = FixtureFetch::new().page("https://example.test/tech.htm", &landing(None));
        let urls = discover(&fetcher, "https://example.test/tech.htm", &options(50))
            .await
            .unwrap();
        assert_eq!(urls.len(), 3);
        assert_eq!(fetcher.requested(), vec!["https://example.test/tech.htm"]);
    }

    #[tokio::test]
    async fn test_stops_one_page_after_progress_ends() {
        // Pages 2 and 3 add URLs; page 4 repeats page 3, so page 4 is the last request.
        let fetcher = FixtureFetch::new()
            .page("https://example.test/tech.htm", &landing(Some("7")))
            .page("https://example.test/timeline/7/trang-2.htm", &grid(&["/p2-a.htm", "/p2-b.htm"]))
            .page("https://example.test/timeline/7/trang-3.htm", &grid(&["/p3-a.htm"]))
            .page(
                "https://example.test/timeline/7/trang-4.htm",
                &grid(&["/p3-a.htm", "/main-3.htm"]),
            )
            .page("https://example.test/timeline/7/trang-5.htm", &grid(&["/never.htm"]));

        let urls = discover(&fetcher, "https://example.test/tech.htm", &options(100))
            .await
            .unwrap();

        assert_eq!(urls.len(), 6);
        let requested = fetcher.requested();
        assert_eq!(requested.last().unwrap(), "https://example.test/timeline/7/trang-4.htm");
        assert!(!requested.iter().any(|u| u.ends_with("trang-5.htm")));
    }

    #[tokio::test]
    async fn test_limit_caps_result_and_pagination() {
        let fetcher = FixtureFetch::new()
            .page("https://example.test/tech.htm", &landing(Some("7")))
            .page("https://example.test/timeline/7/trang-2.htm", &grid(&["/p2-a.htm", "/p2-b.htm"]))
            .page("https://example.test/timeline/7/trang-3.htm", &grid(&["/p3-a.htm"]));

        let urls = discover(&fetcher, "https://example.test/tech.htm", &options(4))
            .await
            .unwrap();

        assert_eq!(urls.len(), 4);
        assert!(!fetcher.requested().iter().any(|u| u.ends_with("trang-3.htm")));
    }

    #[tokio::test]
    async fn test_zero_limit_issues_no_requests() {
        let fetcher = FixtureFetch::new();
        let urls = discover(&fetcher, "https://example.test/tech.htm", &options(0))
            .await
            .unwrap();
        assert!(urls.is_empty());
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_timeline_failure_ends_discovery_gracefully() {
        let fetcher =
            FixtureFetch::new().page("https://example.test/tech.htm", &landing(Some("7")));
        let urls = discover(&fetcher, "https://example.test/tech.htm", &options(100))
            .await
            .unwrap();
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn test_feed_links() {
        let xml = r#"<?xml version="1.0"?><rss><channel>
            <link>https://example.test/</link>
            <item><title>A</title><link><![CDATA[https://example.test/a-1.htm]]></link></item>
            <item><title>B</title><link>https://example.test/video.htm</link></item>
            <item><title>C</title><link>https://example.test/c-3.htm</link></item>
            </channel></rss>"#;
        assert_eq!(
            feed_links(xml, ORIGIN).unwrap(),
            vec!["https://example.test/a-1.htm", "https://example.test/c-3.htm"]
        );
    }

    #[test]
    fn test_feed_link_entities_are_resolved() {
        let xml = r#"<rss><channel><item>
            <link>https://example.test/tin-&amp;-anh-&#52;.htm?utm=rss&amp;x=1</link>
            </item></channel></rss>"#;
        assert_eq!(
            feed_links(xml, ORIGIN).unwrap(),
            vec!["https://example.test/tin-&-anh-4.htm"]
        );
    }

    #[tokio::test]
    async fn test_discover_categories_from_menu() {
        let home = r#"<ul class="menu-nav">
            <li><a class="nav-link" href="/cong-nghe.htm">Công nghệ</a></li>
            <li><a class="nav-link" href="/video.htm">Video</a></li>
            <li><a class="nav-link" href="https://elsewhere.test/">Ngoài</a></li>
            </ul>"#;
        let fetcher = FixtureFetch::new().page("https://example.test", home);

        let all = discover_categories(&fetcher, "https://example.test", None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let tech = &all["Công nghệ"];
        assert_eq!(tech.url, "https://example.test/cong-nghe.htm");
        assert_eq!(tech.rss, "https://example.test/rss/cong-nghe.rss");
        assert!(!tech.media_only);
        assert!(all["Video"].media_only);

        let filter = vec!["Video".to_string(), "Missing".to_string()];
        let some = discover_categories(&fetcher, "https://example.test", Some(&filter))
            .await
            .unwrap();
        assert_eq!(some.keys().collect::<Vec<_>>(), vec!["Video"]);
    }
}
