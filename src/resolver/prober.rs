// Size prober - header-only estimate of a media URL's size
//
// Never fails: any network problem or missing header yields MediaSize::Unknown.

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use super::config::ResolverConfig;
use super::http::RequestIdentity;
use super::models::MediaSize;

pub struct SizeProber<'a> {
    client: &'a Client,
    config: &'a ResolverConfig,
}

impl<'a> SizeProber<'a> {
    pub fn new(client: &'a Client, config: &'a ResolverConfig) -> Self {
        Self { client, config }
    }

    /// Estimate the size of `url` fetched with `identity`.
    ///
    /// Tries HEAD first; hosts that reject HEAD (or omit its length) get a
    /// one-byte ranged GET whose Content-Range reveals the total.
    pub async fn probe(&self, url: &str, identity: &RequestIdentity) -> MediaSize {
        if let Some(bytes) = self.head(url, identity).await {
            return MediaSize::from_bytes(bytes);
        }
        match self.ranged_get(url, identity).await {
            Some(bytes) => MediaSize::from_bytes(bytes),
            None => {
                debug!(url, "size unknown");
                MediaSize::Unknown
            }
        }
    }

    async fn head(&self, url: &str, identity: &RequestIdentity) -> Option<u64> {
        let resp = identity
            .apply(self.client.head(url))
            .timeout(self.config.probe_timeout())
            .send()
            .await
            .map_err(|e| debug!(url, error = %e, "HEAD probe failed"))
            .ok()?;
        if !resp.status().is_success() {
            debug!(url, status = resp.status().as_u16(), "HEAD probe rejected");
            return None;
        }
        header_length(&resp)
    }

    async fn ranged_get(&self, url: &str, identity: &RequestIdentity) -> Option<u64> {
        let resp = identity
            .apply(self.client.get(url))
            .header(RANGE, "bytes=0-0")
            .timeout(self.config.probe_timeout())
            .send()
            .await
            .map_err(|e| debug!(url, error = %e, "ranged probe failed"))
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        // Dropping the response closes the body without reading it
        if resp.status() == StatusCode::PARTIAL_CONTENT {
            total_from_content_range(&resp)
        } else {
            // Range ignored: a plain 200 carries the full length
            total_from_content_range(&resp).or_else(|| header_length(&resp))
        }
    }
}

/// Content-Length straight from the headers; reqwest's content_length()
/// reports 0 for HEAD responses
fn header_length(resp: &Response) -> Option<u64> {
    resp.headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
}

/// Total size from "bytes 0-0/12345"
fn total_from_content_range(resp: &Response) -> Option<u64> {
    let value = resp.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    parse_content_range_total(value)
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value
        .rsplit_once('/')?
        .1
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
}
