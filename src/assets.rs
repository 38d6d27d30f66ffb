//! Media download for extracted records.
//!
//! Images land in `images/{postId}/` under their remote basename; audio tracks
//! land in `audio/{postId}/` as `{postId}_{n}.{ext}` because tracks often share
//! a basename. A failed download leaves `local_path` unset and never fails the
//! record.

use crate::config::DataLayout;
use crate::models::{Audio, Image};
use crate::scrapers::Fetch;
use futures::stream::{self, StreamExt};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Downloads in flight per article.
const DOWNLOADS_PER_ARTICLE: usize = 4;

fn remote_path(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| u.path().to_string())
}

/// Local file name for the `index`-th image (1-based).
pub fn image_file_name(post_id: &str, index: usize, url: &str) -> String {
    remote_path(url)
        .and_then(|path| path.rsplit('/').next().map(str::to_string))
        .map(|name| {
            urlencoding::decode(&name)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(name)
        })
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && name != "..")
        .unwrap_or_else(|| format!("{post_id}_{index}.jpg"))
}

/// Local file name for the `index`-th audio track (1-based).
pub fn audio_file_name(post_id: &str, index: usize, url: &str) -> String {
    let ext = remote_path(url)
        .and_then(|path| {
            let name = path.rsplit('/').next()?.to_string();
            let (_, ext) = name.rsplit_once('.')?;
            Some(ext.to_string())
        })
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "mp3".to_string());
    format!("{post_id}_{index}.{ext}")
}

async fn download<F: Fetch>(fetcher: &F, url: &str, target: &Path) -> Option<String> {
    match fetcher.fetch_bytes(url).await {
        Ok(bytes) => match fs::write(target, &bytes).await {
            Ok(()) => {
                debug!(%url, bytes = bytes.len(), path = %target.display(), "Saved asset");
                Some(target.to_string_lossy().into_owned())
            }
            Err(e) => {
                warn!(%url, path = %target.display(), error = %e, "Writing asset failed");
                None
            }
        },
        Err(e) => {
            warn!(%url, error = %e, "Asset download failed");
            None
        }
    }
}

async fn prepare_dir(dir: &Path) -> bool {
    match fs::create_dir_all(dir).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                dir = %dir.display(),
                error = %e,
                "Cannot create asset folder; skipping downloads"
            );
            false
        }
    }
}

/// Download every image, attaching `local_path` on success.
#[instrument(level = "info", skip(fetcher, layout, images), fields(count = images.len()))]
pub async fn fetch_images<F: Fetch>(
    fetcher: &F,
    layout: &DataLayout,
    post_id: &str,
    images: Vec<Image>,
) -> Vec<Image> {
    if images.is_empty() {
        return images;
    }
    let dir = layout.image_dir(post_id);
    if !prepare_dir(&dir).await {
        return images;
    }

    let images: Vec<Image> = stream::iter(images.into_iter().enumerate())
        .map(|(i, mut image)| {
            let target = dir.join(image_file_name(post_id, i + 1, &image.url));
            async move {
                image.local_path = download(fetcher, &image.url, &target).await;
                image
            }
        })
        .buffered(DOWNLOADS_PER_ARTICLE)
        .collect()
        .await;

    let saved = images.iter().filter(|i| i.local_path.is_some()).count();
    info!(saved, total = images.len(), "Images processed");
    images
}

/// Download every audio track, attaching `local_path` on success.
#[instrument(level = "info", skip(fetcher, layout, audio), fields(count = audio.len()))]
pub async fn fetch_audio<F: Fetch>(
    fetcher: &F,
    layout: &DataLayout,
    post_id: &str,
    audio: Vec<Audio>,
) -> Vec<Audio> {
    if audio.is_empty() {
        return audio;
    }
    let dir = layout.audio_dir(post_id);
    if !prepare_dir(&dir).await {
        return audio;
    }

    let audio: Vec<Audio> = stream::iter(audio.into_iter().enumerate())
        .map(|(i, mut track)| {
            let target = dir.join(audio_file_name(post_id, i + 1, &track.url));
            async move {
                track.local_path = download(fetcher, &track.url, &target).await;
                track
            }
        })
        .buffered(DOWNLOADS_PER_ARTICLE)
        .collect()
        .await;

    let saved = audio.iter().filter(|a| a.local_path.is_some()).count();
    info!(saved, total = audio.len(), "Audio processed");
    audio
}
