// Delivery layer - outward shapes for a ResolvedPost
//
// - metadata: JSON body with the size probe applied
// - raw bytes: selected variant (or one gallery image) relayed chunk by chunk
// - errors: short summary plus optional upstream detail

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::resolver::{
    MediaSize, PostMedia, PostResolver, PostStats, ResolutionFailure, ResolvedPost,
};

/// What the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryIntent {
    Metadata,
    /// Selected video variant; first image for galleries
    Raw,
    /// One gallery image by position
    Image { index: usize },
}

impl DeliveryIntent {
    /// Map request parameters (`download` flag, optional `index`) onto an intent
    pub fn from_params(download: bool, index: Option<usize>) -> Self {
        match (download, index) {
            (_, Some(index)) => Self::Image { index },
            (true, None) => Self::Raw,
            (false, None) => Self::Metadata,
        }
    }
}

/// JSON body of a metadata request
#[derive(Debug, Clone, Serialize)]
pub struct MetadataResponse {
    pub status: bool,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub author: String,
    pub author_avatar: Option<String>,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub duration: Option<u64>,
    pub size_mb: MediaSize,
    pub quality: String,
    pub stats: Option<PostStats>,
    pub source: &'static str,
}

impl MetadataResponse {
    pub fn new(post: &ResolvedPost, size: MediaSize) -> Self {
        Self {
            status: true,
            id: post.id.to_string(),
            kind: post.kind().label(),
            title: post.title.clone(),
            author: post.author_name.clone(),
            author_avatar: post.author_avatar_url.clone(),
            thumbnail: post.thumbnail_url.clone(),
            images: post.images().iter().map(|i| i.url.clone()).collect(),
            video_url: post.selected_variant().map(|v| v.url.clone()),
            audio_url: post.audio_url.clone(),
            duration: post.duration_secs,
            size_mb: size,
            quality: post.quality.clone(),
            stats: post.stats.clone(),
            source: post.source,
        }
    }
}

/// JSON body of a failed request
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub client_error: bool,
}

impl From<&ResolutionFailure> for ErrorResponse {
    fn from(failure: &ResolutionFailure) -> Self {
        Self {
            status: false,
            message: failure.summary(),
            detail: failure.detail(),
            client_error: failure.is_client_error(),
        }
    }
}

/// Probe the size of the deliverable media and build the metadata body
pub async fn describe(resolver: &PostResolver, post: &ResolvedPost) -> MetadataResponse {
    let size = resolver.probe_size(post).await;
    debug!(post_id = %post.id, size = %size, "size probed");
    MetadataResponse::new(post, size)
}

/// Concrete media to fetch for an intent, in preference order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    /// Candidate URLs; later ones are fallbacks
    pub urls: Vec<String>,
    pub default_content_type: &'static str,
    pub filename: String,
}

/// Pick the media for `intent` without any network I/O.
///
/// An out-of-range index, or an image index on a video post, is a client
/// error.
pub fn select_target(
    post: &ResolvedPost,
    intent: DeliveryIntent,
) -> Result<MediaTarget, ResolutionFailure> {
    match (&post.media, intent) {
        (_, DeliveryIntent::Metadata) => Err(ResolutionFailure::MediaFetchFailed(
            "metadata requests carry no media".to_string(),
        )),
        (PostMedia::Video { selected, alternates }, DeliveryIntent::Raw) => Ok(MediaTarget {
            urls: std::iter::once(selected)
                .chain(alternates.iter())
                .map(|v| v.url.clone())
                .collect(),
            default_content_type: "video/mp4",
            filename: format!("{}.mp4", post.id),
        }),
        (PostMedia::Video { .. }, DeliveryIntent::Image { index }) => {
            Err(ResolutionFailure::IndexOutOfRange { index, len: 0 })
        }
        (PostMedia::Gallery { images }, DeliveryIntent::Raw) => image_target(post, images, 0),
        (PostMedia::Gallery { images }, DeliveryIntent::Image { index }) => {
            image_target(post, images, index)
        }
    }
}

fn image_target(
    post: &ResolvedPost,
    images: &[crate::resolver::ImageItem],
    index: usize,
) -> Result<MediaTarget, ResolutionFailure> {
    let image = images.get(index).ok_or(ResolutionFailure::IndexOutOfRange {
        index,
        len: images.len(),
    })?;
    Ok(MediaTarget {
        urls: vec![image.url.clone()],
        default_content_type: "image/jpeg",
        filename: format!("{}_{}.jpg", post.id, index),
    })
}

/// An opened upstream media response, ready to be relayed
pub struct MediaDownload {
    pub content_type: String,
    pub filename: String,
    pub content_length: Option<u64>,
    response: Response,
    idle_timeout: Duration,
}

impl std::fmt::Debug for MediaDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDownload")
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .field("content_length", &self.content_length)
            .finish()
    }
}

impl MediaDownload {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }

    /// Upstream body as a chunk stream; a silence longer than the idle
    /// timeout ends it with an error
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, ResolutionFailure>> + Send {
        let idle = self.idle_timeout;
        let upstream = Box::pin(self.response.bytes_stream());

        futures_util::stream::unfold(Some(upstream), move |state| async move {
            let mut upstream = state?;
            match tokio::time::timeout(idle, upstream.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(upstream))),
                Ok(Some(Err(e))) => Some((
                    Err(ResolutionFailure::MediaFetchFailed(format!("upstream read failed: {}", e))),
                    None,
                )),
                Ok(None) => None,
                Err(_) => Some((
                    Err(ResolutionFailure::MediaFetchFailed(format!(
                        "upstream stalled for {}s",
                        idle.as_secs()
                    ))),
                    None,
                )),
            }
        })
    }

    /// Copy the body into `sink` chunk by chunk. Cancelling `cancel` drops
    /// the upstream response mid-transfer.
    pub async fn relay<W>(self, sink: &mut W, cancel: &CancellationToken) -> Result<u64, ResolutionFailure>
    where
        W: AsyncWrite + Unpin,
    {
        let filename = self.filename.clone();
        let stream = self.into_stream();
        tokio::pin!(stream);
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(filename = %filename, written, "delivery cancelled, aborting upstream fetch");
                    return Err(ResolutionFailure::MediaFetchFailed("cancelled".to_string()));
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    sink.write_all(&chunk).await.map_err(|e| {
                        ResolutionFailure::MediaFetchFailed(format!("writing to sink failed: {}", e))
                    })?;
                    written += chunk.len() as u64;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        sink.flush()
            .await
            .map_err(|e| ResolutionFailure::MediaFetchFailed(format!("flushing sink failed: {}", e)))?;
        info!(filename = %filename, bytes = written, "media delivered");
        Ok(written)
    }
}

/// Open the upstream response for a raw-bytes or indexed-image request.
///
/// Bounds are checked before any network I/O. Video variants are tried in
/// order until one answers successfully.
pub async fn open_media(
    resolver: &PostResolver,
    post: &ResolvedPost,
    intent: DeliveryIntent,
) -> Result<MediaDownload, ResolutionFailure> {
    let target = select_target(post, intent)?;
    let config = resolver.config();
    let mut last_error = String::from("no media candidates");

    for url in &target.urls {
        let request = post.fetch_identity.apply(resolver.client().get(url)).send();
        let resp = match tokio::time::timeout(config.stream_connect_timeout(), request).await {
            Ok(Ok(resp)) if resp.status().is_success() => resp,
            Ok(Ok(resp)) => {
                warn!(url = %url, status = resp.status().as_u16(), "media candidate rejected");
                last_error = format!("HTTP {}", resp.status().as_u16());
                continue;
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "media candidate unreachable");
                last_error = e.to_string();
                continue;
            }
            Err(_) => {
                warn!(url = %url, "media candidate timed out");
                last_error = "connect deadline exceeded".to_string();
                continue;
            }
        };

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(target.default_content_type)
            .to_string();

        debug!(url = %url, content_type = %content_type, "media stream opened");
        return Ok(MediaDownload {
            content_type,
            filename: target.filename,
            content_length: resp.content_length(),
            response: resp,
            idle_timeout: config.stream_idle_timeout(),
        });
    }

    Err(ResolutionFailure::MediaFetchFailed(last_error))
}
