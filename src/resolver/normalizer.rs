// Schema normalizer - maps any raw payload onto ResolvedPost
//
// Upstream shapes differ (web camelCase, mobile snake_case, aggregator flat),
// so every field is a list of JSON pointers tried in order with an explicit
// default. Only the id, the kind, and at least one playable/viewable resource
// gate success.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use super::config::WatermarkRule;
use super::errors::StrategyError;
use super::models::{
    ImageItem, MediaVariant, PostId, PostMedia, PostStats, RawPayload, ResolvedPost,
};

/// Envelopes around the item object, tried in order
const ITEM_ENVELOPES: &[&str] = &[
    "/itemInfo/itemStruct",
    "/__DEFAULT_SCOPE__/webapp.video-detail/itemInfo/itemStruct",
    "/aweme_detail",
    "/aweme_details/0",
    "/aweme_list/0",
    "/data",
];

const ID_PATHS: &[&str] = &["/id", "/aweme_id", "/id_str", "/video_id"];
const TITLE_PATHS: &[&str] = &["/desc", "/title", "/contents/0/desc"];
const AUTHOR_NAME_PATHS: &[&str] = &[
    "/author/nickname",
    "/author/unique_id",
    "/author/uniqueId",
    "/nickname",
];
const AUTHOR_HANDLE_PATHS: &[&str] = &["/author/uniqueId", "/author/unique_id"];
const AVATAR_PATHS: &[&str] = &[
    "/author/avatarLarger",
    "/author/avatarMedium",
    "/author/avatarThumb",
    "/author/avatar_larger",
    "/author/avatar_medium",
    "/author/avatar_thumb",
    "/author/avatar",
];
const COVER_PATHS: &[&str] = &[
    "/video/originCover",
    "/video/cover",
    "/video/origin_cover",
    "/origin_cover",
    "/cover",
];
const AUDIO_PATHS: &[&str] = &[
    "/music/playUrl",
    "/music/play_url",
    "/music_info/play",
    "/music",
];
const DURATION_PATHS: &[&str] = &["/video/duration", "/duration"];
const HEIGHT_PATHS: &[&str] = &["/video/height", "/video/play_addr/height"];
const QUALITY_PATHS: &[&str] = &["/video/ratio", "/video/definition", "/video/videoQuality"];
const CREATED_PATHS: &[&str] = &["/createTime", "/create_time"];
const REGION_PATHS: &[&str] = &["/locationCreated", "/region"];

const BITRATE_LIST_PATHS: &[&str] = &["/video/bitrateInfo", "/video/bit_rate"];
const IMAGE_LIST_PATHS: &[&str] = &["/imagePost/images", "/image_post_info/images", "/images"];

/// Single default play addresses, best first; `true` marks sources that are
/// watermarked unless the marker can be stripped
const DEFAULT_PLAY_SOURCES: &[(&str, bool)] = &[
    ("/hdplay", false),
    ("/video/playAddr", false),
    ("/video/play_addr", false),
    ("/play", false),
    ("/video/download_addr", true),
    ("/video/downloadAddr", true),
    ("/wmplay", true),
];

/// Stateless normalizer configured with the watermark substitution
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    watermark: WatermarkRule,
}

impl Normalizer {
    pub fn new(watermark: WatermarkRule) -> Self {
        Self { watermark }
    }

    /// Replace the watermark marker to obtain the unbranded URL. Idempotent.
    pub fn strip_watermark(&self, url: &str) -> String {
        if self.watermark.marker.is_empty() || !url.contains(&self.watermark.marker) {
            return url.to_string();
        }
        url.replace(&self.watermark.marker, &self.watermark.replacement)
    }

    pub fn has_watermark_marker(&self, url: &str) -> bool {
        !self.watermark.marker.is_empty() && url.contains(&self.watermark.marker)
    }

    /// Strip a variant; variants that stay branded are dropped
    fn clean_variant(&self, variant: MediaVariant) -> Option<MediaVariant> {
        let marked = self.has_watermark_marker(&variant.url);
        if variant.watermarked && !marked {
            return None;
        }
        let url = self.strip_watermark(&variant.url);
        Some(MediaVariant {
            url,
            watermarked: false,
            ..variant
        })
    }

    /// Map a raw payload onto the canonical post
    pub fn normalize(&self, payload: &RawPayload) -> Result<ResolvedPost, StrategyError> {
        let item = locate_item(&payload.document);
        if !item.is_object() {
            return Err(StrategyError::malformed("payload has no item object"));
        }

        let id = str_at(item, ID_PATHS)
            .map(PostId::new)
            .unwrap_or_else(|| payload.post_id.clone());
        if id.as_str().is_empty() {
            return Err(StrategyError::malformed("payload has no post id"));
        }

        let mobile_shape = item.get("aweme_id").is_some();
        let duration_secs = num_at(item, DURATION_PATHS).map(|d| {
            // Mobile payloads report milliseconds
            if mobile_shape && d >= 1000 {
                d / 1000
            } else {
                d
            }
        });
        let thumbnail_url = image_url_at(item, COVER_PATHS);

        let images = extract_images(item);
        let (media, quality) = if !images.is_empty() {
            (PostMedia::Gallery { images }, None)
        } else {
            let variants: Vec<MediaVariant> = collect_variants(item)
                .into_iter()
                .filter_map(|v| self.clean_variant(v))
                .collect();
            let mut variants = dedup_by_url(variants);

            if variants.is_empty() {
                // Photo fallback: zero-length video whose only resource is its cover
                match (&thumbnail_url, duration_secs.unwrap_or(0)) {
                    (Some(cover), 0) => {
                        debug!(post_id = %id, "no playable video; using cover as sole image");
                        (
                            PostMedia::Gallery {
                                images: vec![ImageItem::new(cover.clone(), 0, 0)],
                            },
                            None,
                        )
                    }
                    _ => {
                        return Err(StrategyError::not_found(
                            "payload has no playable or viewable resource",
                        ))
                    }
                }
            } else {
                let selected = variants.remove(0);
                let quality = quality_label(&selected, item);
                (
                    PostMedia::Video {
                        selected,
                        alternates: variants,
                    },
                    Some(quality),
                )
            }
        };

        let stats = extract_stats(item);

        Ok(ResolvedPost {
            id,
            title: str_at(item, TITLE_PATHS).unwrap_or_default(),
            author_name: str_at(item, AUTHOR_NAME_PATHS).unwrap_or_else(|| "Unknown".to_string()),
            author_handle: str_at(item, AUTHOR_HANDLE_PATHS),
            author_avatar_url: image_url_at(item, AVATAR_PATHS),
            stats: (!stats.is_empty()).then_some(stats),
            media,
            thumbnail_url,
            audio_url: url_at(item, AUDIO_PATHS),
            duration_secs,
            quality: quality.unwrap_or_else(|| "Unknown".to_string()),
            created_at: num_at(item, CREATED_PATHS).and_then(format_timestamp),
            region: str_at(item, REGION_PATHS),
            source: payload.strategy,
            fetch_identity: payload.identity.clone(),
        })
    }
}

/// Unwrap known envelopes; a bare item is returned as-is
pub fn locate_item(document: &Value) -> &Value {
    ITEM_ENVELOPES
        .iter()
        .filter_map(|p| document.pointer(p))
        .find(|v| v.is_object())
        .unwrap_or(document)
}

/// Bitrate-tagged encodings sorted best first, else the default play addresses
fn collect_variants(item: &Value) -> Vec<MediaVariant> {
    let mut ranked: Vec<MediaVariant> = BITRATE_LIST_PATHS
        .iter()
        .filter_map(|p| item.pointer(p).and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| {
            let url = first_url(
                entry
                    .get("PlayAddr")
                    .or_else(|| entry.get("play_addr"))?,
            )?;
            let bitrate = num_at(entry, &["/Bitrate", "/bit_rate", "/bitrate"]);
            let gear = str_at(entry, &["/GearName", "/gear_name"]);
            let height = num_at(entry, &["/PlayAddr/Height", "/play_addr/height"]).map(|h| h as u32);
            Some(
                MediaVariant::new(url)
                    .with_bitrate(bitrate)
                    .with_gear(gear)
                    .with_height(height),
            )
        })
        .collect();

    // Stable sort keeps upstream order among equal bitrates
    ranked.sort_by(|a, b| b.bitrate.unwrap_or(0).cmp(&a.bitrate.unwrap_or(0)));

    let defaults = DEFAULT_PLAY_SOURCES.iter().filter_map(|(path, watermarked)| {
        item.pointer(path)
            .and_then(first_url)
            .map(|url| MediaVariant::new(url).with_watermark(*watermarked))
    });

    ranked.extend(defaults);
    ranked
}

fn dedup_by_url(variants: Vec<MediaVariant>) -> Vec<MediaVariant> {
    let mut seen = std::collections::HashSet::new();
    variants
        .into_iter()
        .filter(|v| seen.insert(v.url.clone()))
        .collect()
}

/// Gallery images in slide order; each takes the last (best) candidate URL
fn extract_images(item: &Value) -> Vec<ImageItem> {
    let Some(entries) = IMAGE_LIST_PATHS
        .iter()
        .filter_map(|p| item.pointer(p).and_then(Value::as_array))
        .find(|a| !a.is_empty())
    else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            if let Some(url) = entry.as_str().filter(|s| !s.is_empty()) {
                return Some(ImageItem::new(url, 0, 0));
            }
            let candidates = [
                "/imageURL/urlList",
                "/display_image/url_list",
                "/imageUrl/urlList",
                "/urlList",
                "/url_list",
            ];
            let url = candidates
                .iter()
                .filter_map(|p| entry.pointer(p).and_then(Value::as_array))
                .find_map(|list| last_string(list))?;
            let width = num_at(entry, &["/imageWidth", "/display_image/width", "/width"]).unwrap_or(0);
            let height =
                num_at(entry, &["/imageHeight", "/display_image/height", "/height"]).unwrap_or(0);
            Some(ImageItem::new(url, width as u32, height as u32))
        })
        .collect()
}

fn extract_stats(item: &Value) -> PostStats {
    PostStats {
        views: num_at(
            item,
            &["/stats/playCount", "/statsV2/playCount", "/statistics/play_count", "/play_count"],
        ),
        likes: num_at(
            item,
            &["/stats/diggCount", "/statsV2/diggCount", "/statistics/digg_count", "/digg_count"],
        ),
        comments: num_at(
            item,
            &[
                "/stats/commentCount",
                "/statsV2/commentCount",
                "/statistics/comment_count",
                "/comment_count",
            ],
        ),
        shares: num_at(
            item,
            &["/stats/shareCount", "/statsV2/shareCount", "/statistics/share_count", "/share_count"],
        ),
    }
}

/// Best guess: gear tag, then height, then whatever ratio label upstream gives
fn quality_label(selected: &MediaVariant, item: &Value) -> String {
    if let Some(gear) = &selected.gear {
        return gear.clone();
    }
    if let Some(h) = selected
        .height
        .or_else(|| num_at(item, HEIGHT_PATHS).map(|h| h as u32))
        .filter(|h| *h > 0)
    {
        return format!("{}p", h);
    }
    str_at(item, QUALITY_PATHS).unwrap_or_else(|| "Unknown".to_string())
}

fn format_timestamp(secs: u64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(secs as i64)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

/// First non-empty string (numbers are stringified) among the pointers
fn str_at(v: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| match v.pointer(p)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-negative integer among the pointers; numeric strings accepted
fn num_at(v: &Value, paths: &[&str]) -> Option<u64> {
    paths.iter().find_map(|p| match v.pointer(p)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// First URL among the pointers (string, or object carrying a URL list)
fn url_at(v: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| v.pointer(p).and_then(first_url))
}

/// Like url_at, but image candidate lists yield their last (best) entry
fn image_url_at(v: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| {
        let node = v.pointer(p)?;
        match node {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(_) => url_list(node).and_then(|l| last_string(l)),
            _ => None,
        }
    })
}

/// A media address: plain string, or object with url_list/UrlList/urlList
fn first_url(node: &Value) -> Option<String> {
    match node {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => url_list(node)?
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn url_list(node: &Value) -> Option<&Vec<Value>> {
    ["url_list", "UrlList", "urlList"]
        .iter()
        .find_map(|k| node.get(*k).and_then(Value::as_array))
}

fn last_string(list: &[Value]) -> Option<String> {
    list.iter()
        .rev()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
