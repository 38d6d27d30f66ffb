//! Fields that only exist after the page's scripts have run.
//!
//! Both readers assume the caller holds the render lane; [`read_audio`]
//! navigates and [`read_reactions`] reads from the page already loaded.

use crate::error::CrawlError;
use crate::models::{Audio, Reaction};
use crate::render::Renderer;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument};

/// Container holding the article's reaction counters.
pub const REACTION_CONTAINER: &str =
    "#main-detail > div.sendstarauthor > div > div > div.reactinfo";

/// Counter positions inside [`REACTION_CONTAINER`].
const STAR_COUNTER: &str = "span:nth-child(2) > span";
const LIKE_COUNTER: &str = "span:nth-child(3) > span";
const LOVE_COUNTER: &str = "span:nth-child(4) > span";

/// Load `url` and collect the source of every `<audio>` element after `settle`.
#[instrument(level = "debug", skip(renderer))]
pub async fn read_audio<R: Renderer>(
    renderer: &mut R,
    url: &str,
    settle: Duration,
) -> Result<Vec<Audio>, CrawlError> {
    renderer.navigate(url).await?;
    // Audio players are injected by deferred scripts.
    sleep(settle).await;

    let audio = renderer
        .query_all("audio", Some("src"))
        .await?
        .into_iter()
        .filter_map(|node| node.attribute)
        .filter(|src| !src.is_empty())
        .map(|url| Audio {
            url,
            local_path: None,
        })
        .collect::<Vec<_>>();
    debug!(count = audio.len(), "Audio sources found");
    Ok(audio)
}

/// Parse a displayed counter such as `1,204`. Anything non-numeric is zero.
pub fn parse_counter(text: &str) -> u64 {
    let digits: String = text.trim().chars().filter(|c| *c != ',' && *c != '.').collect();
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().unwrap_or(0)
    } else {
        0
    }
}

/// Wait for the reaction bar and read the star, like and love counters.
///
/// Fails if the bar never appears within `wait`; absent counters read as zero.
#[instrument(level = "debug", skip(renderer))]
pub async fn read_reactions<R: Renderer>(
    renderer: &mut R,
    wait: Duration,
) -> Result<Reaction, CrawlError> {
    renderer.wait_for(REACTION_CONTAINER, wait).await?;

    let mut reaction = Reaction::default();
    for (slot, position) in [
        (&mut reaction.star, STAR_COUNTER),
        (&mut reaction.like, LIKE_COUNTER),
        (&mut reaction.love, LOVE_COUNTER),
    ] {
        let selector = format!("{REACTION_CONTAINER} > {position}");
        *slot = renderer
            .query_all(&selector, None)
            .await?
            .first()
            .map(|node| parse_counter(&node.text))
            .unwrap_or(0);
    }
    Ok(reaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NodeSnapshot;
    use crate::render::testing::ScriptedRenderer;

    fn text(t: &str) -> Vec<NodeSnapshot> {
        vec![NodeSnapshot {
            attribute: None,
            text: t.to_string(),
        }]
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter("42"), 42);
        assert_eq!(parse_counter(" 1,204 "), 1204);
        assert_eq!(parse_counter("1.5K"), 0);
        assert_eq!(parse_counter(""), 0);
        assert_eq!(parse_counter("-3"), 0);
    }

    #[tokio::test]
    async fn test_read_audio_skips_missing_sources() {
        let mut renderer = ScriptedRenderer::default().with_nodes(
            "audio",
            vec![
                NodeSnapshot {
                    attribute: Some("https://cdn.example.test/a.mp3".into()),
                    text: String::new(),
                },
                NodeSnapshot::default(),
            ],
        );
        let audio = read_audio(&mut renderer, "https://example.test/a-1.htm", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].url, "https://cdn.example.test/a.mp3");
    }

    #[tokio::test]
    async fn test_read_reactions_by_position() {
        let mut renderer = ScriptedRenderer::default()
            .with_present(REACTION_CONTAINER)
            .with_nodes(&format!("{REACTION_CONTAINER} > {STAR_COUNTER}"), text("5"))
            .with_nodes(&format!("{REACTION_CONTAINER} > {LIKE_COUNTER}"), text("1,002"))
            .with_nodes(&format!("{REACTION_CONTAINER} > {LOVE_COUNTER}"), text("n/a"));

        let reaction = read_reactions(&mut renderer, Duration::ZERO).await.unwrap();
        assert_eq!(
            reaction,
            Reaction {
                star: 5,
                like: 1002,
                love: 0
            }
        );
    }

    #[tokio::test]
    async fn test_read_reactions_times_out_without_bar() {
        let mut renderer = ScriptedRenderer::default();
        let err = read_reactions(&mut renderer, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, CrawlError::Timeout(_)));
    }
}
