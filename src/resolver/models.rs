// Canonical data model shared by every stage of the pipeline

use serde::{Serialize, Serializer};
use std::fmt;

use super::http::RequestIdentity;

/// Raw input URL plus its post-redirect form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentLocator {
    pub raw: String,
    pub resolved: String,
}

impl ContentLocator {
    pub fn new(raw: impl Into<String>, resolved: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            resolved: resolved.into(),
        }
    }

    /// Locator that was never followed (no redirect, or resolution failed)
    pub fn unresolved(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            resolved: raw.clone(),
            raw,
        }
    }
}

/// Opaque post identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a strategy needs to query an upstream for one request
#[derive(Debug, Clone)]
pub struct Session {
    pub locator: ContentLocator,
    pub post_id: PostId,
    /// Cookie header captured while following redirects
    pub cookie: Option<String>,
}

impl Session {
    pub fn new(locator: ContentLocator, post_id: PostId) -> Self {
        Self {
            locator,
            post_id,
            cookie: None,
        }
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }
}

/// Strategy-specific JSON document, not yet normalized
#[derive(Debug, Clone)]
pub struct RawPayload {
    /// Name of the strategy that produced it
    pub strategy: &'static str,
    /// The post ID the strategy was asked for
    pub post_id: PostId,
    pub document: serde_json::Value,
    /// Identity that media URLs in this payload must be fetched with
    pub identity: RequestIdentity,
}

/// One playable encoding of a video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaVariant {
    pub url: String,
    /// Bitrate in bits per second, when upstream reports one
    pub bitrate: Option<u64>,
    pub watermarked: bool,
    /// Upstream quality tag (e.g. "normal_1080_0")
    pub gear: Option<String>,
    pub height: Option<u32>,
}

impl MediaVariant {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bitrate: None,
            watermarked: false,
            gear: None,
            height: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: Option<u64>) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_watermark(mut self, watermarked: bool) -> Self {
        self.watermarked = watermarked;
        self
    }

    pub fn with_gear(mut self, gear: Option<String>) -> Self {
        self.gear = gear;
        self
    }

    pub fn with_height(mut self, height: Option<u32>) -> Self {
        self.height = height;
        self
    }
}

/// One image in a gallery. Width/height are 0 when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageItem {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl ImageItem {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Video,
    ImageGallery,
}

impl PostKind {
    /// Wire label used in metadata responses
    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::ImageGallery => "image",
        }
    }
}

/// Engagement counters; each one may be missing independently
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostStats {
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
}

impl PostStats {
    pub fn is_empty(&self) -> bool {
        self.views.is_none() && self.likes.is_none() && self.comments.is_none() && self.shares.is_none()
    }
}

/// Playable/viewable resources of a post
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostMedia {
    Video {
        selected: MediaVariant,
        /// Fallback encodings, best first
        alternates: Vec<MediaVariant>,
    },
    Gallery { images: Vec<ImageItem> },
}

/// Canonical output of the pipeline. Lives for one request.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPost {
    pub id: PostId,
    pub title: String,
    pub author_name: String,
    pub author_handle: Option<String>,
    pub author_avatar_url: Option<String>,
    pub stats: Option<PostStats>,
    pub media: PostMedia,
    pub thumbnail_url: Option<String>,
    pub audio_url: Option<String>,
    pub duration_secs: Option<u64>,
    /// Best-effort descriptive label, never verified
    pub quality: String,
    /// RFC 3339 creation time
    pub created_at: Option<String>,
    pub region: Option<String>,
    /// Strategy that produced the payload
    pub source: &'static str,
    #[serde(skip)]
    pub fetch_identity: RequestIdentity,
}

impl ResolvedPost {
    pub fn kind(&self) -> PostKind {
        match self.media {
            PostMedia::Video { .. } => PostKind::Video,
            PostMedia::Gallery { .. } => PostKind::ImageGallery,
        }
    }

    pub fn selected_variant(&self) -> Option<&MediaVariant> {
        match &self.media {
            PostMedia::Video { selected, .. } => Some(selected),
            PostMedia::Gallery { .. } => None,
        }
    }

    pub fn images(&self) -> &[ImageItem] {
        match &self.media {
            PostMedia::Gallery { images } => images,
            PostMedia::Video { .. } => &[],
        }
    }
}

/// Estimated media size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaSize {
    /// Megabytes rounded to two decimals
    Megabytes(f64),
    Unknown,
}

impl MediaSize {
    pub fn from_bytes(bytes: u64) -> Self {
        if bytes == 0 {
            return Self::Unknown;
        }
        let mb = bytes as f64 / 1024.0 / 1024.0;
        Self::Megabytes((mb * 100.0).round() / 100.0)
    }
}

impl fmt::Display for MediaSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Megabytes(mb) => write!(f, "{:.2}", mb),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

// Number when known, the string "Unknown" otherwise
impl Serialize for MediaSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Megabytes(mb) => serializer.serialize_f64(*mb),
            Self::Unknown => serializer.serialize_str("Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_size_rounding() {
        assert_eq!(MediaSize::from_bytes(5 * 1024 * 1024), MediaSize::Megabytes(5.0));
        assert_eq!(MediaSize::from_bytes(1_234_567), MediaSize::Megabytes(1.18));
        assert_eq!(MediaSize::from_bytes(0), MediaSize::Unknown);
    }

    #[test]
    fn test_media_size_serialization() {
        assert_eq!(serde_json::to_string(&MediaSize::Megabytes(2.5)).unwrap(), "2.5");
        assert_eq!(serde_json::to_string(&MediaSize::Unknown).unwrap(), "\"Unknown\"");
        assert_eq!(MediaSize::Megabytes(2.5).to_string(), "2.50");
    }

    #[test]
    fn test_kind_follows_media() {
        let post = ResolvedPost {
            id: PostId::new("1"),
            title: String::new(),
            author_name: "Unknown".to_string(),
            author_handle: None,
            author_avatar_url: None,
            stats: None,
            media: PostMedia::Gallery {
                images: vec![ImageItem::new("a.jpg", 0, 0)],
            },
            thumbnail_url: None,
            audio_url: None,
            duration_secs: None,
            quality: "Unknown".to_string(),
            created_at: None,
            region: None,
            source: "test",
            fetch_identity: RequestIdentity::default(),
        };
        assert_eq!(post.kind(), PostKind::ImageGallery);
        assert_eq!(post.kind().label(), "image");
        assert!(post.selected_variant().is_none());
        assert_eq!(post.images().len(), 1);
    }
}
