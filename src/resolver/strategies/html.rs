// HTML rehydration strategy - scrape the state blob embedded in the post page
//
// Used when the structured APIs are blocked. The page request carries the
// session cookie from redirect resolution and the resolved locator as referer;
// cookies the page sets are kept for media fetches.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::traits::{ResolverStrategy, StrategyContext};
use crate::resolver::diagnostics::{check_status, diagnose_body};
use crate::resolver::errors::StrategyError;
use crate::resolver::http::{read_text, send_with_retry, RequestIdentity};
use crate::resolver::models::{RawPayload, Session};

lazy_static::lazy_static! {
    static ref UNIVERSAL_DATA_RE: Regex = Regex::new(
        r#"(?s)<script[^>]*id="__UNIVERSAL_DATA_FOR_REHYDRATION__"[^>]*>(.*?)</script>"#
    ).unwrap();
    static ref SIGI_STATE_RE: Regex = Regex::new(
        r#"(?s)<script[^>]*id="SIGI_STATE"[^>]*>(.*?)</script>"#
    ).unwrap();
}

const VIDEO_DETAIL_PATH: &str = "/__DEFAULT_SCOPE__/webapp.video-detail";

pub struct HtmlStrategy;

/// Pull the item object for `post_id` out of a rendered page
pub fn extract_item(html: &str, post_id: &str) -> Result<Value, StrategyError> {
    if let Some(blob) = capture(&UNIVERSAL_DATA_RE, html) {
        let state: Value = serde_json::from_str(blob)?;
        let detail = state
            .pointer(VIDEO_DETAIL_PATH)
            .ok_or_else(|| StrategyError::malformed("rehydration blob has no video-detail scope"))?;
        if let Some(reason) = diagnose_body(detail) {
            return Err(reason.into_error("html"));
        }
        return detail
            .pointer("/itemInfo/itemStruct")
            .cloned()
            .ok_or_else(|| StrategyError::not_found("video-detail scope has no itemStruct"));
    }

    if let Some(blob) = capture(&SIGI_STATE_RE, html) {
        let state: Value = serde_json::from_str(blob)?;
        return state
            .get("ItemModule")
            .and_then(|module| module.get(post_id))
            .cloned()
            .ok_or_else(|| StrategyError::not_found("ItemModule has no entry for the post"));
    }

    Err(StrategyError::malformed("page carries no embedded state"))
}

fn capture<'h>(re: &Regex, html: &'h str) -> Option<&'h str> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ResolverStrategy for HtmlStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<RawPayload, StrategyError> {
        let url = ctx
            .config
            .endpoints
            .web(&format!("/@i/video/{}", session.post_id));
        let mut identity = RequestIdentity::desktop(ctx.config)
            .with_referer(Some(session.locator.resolved.clone()))
            .with_cookie(session.cookie.clone());

        debug!(strategy = self.name(), post_id = %session.post_id, "fetching post page");
        let request_identity = identity.clone();
        let resp = send_with_retry(&ctx.config.retry, self.name(), || {
            request_identity
                .apply(ctx.client.get(&url))
                .timeout(ctx.config.request_timeout())
        })
        .await?;

        check_status(resp.status(), self.name())?;
        identity.absorb_cookies(resp.headers());
        let html = read_text(resp).await?;

        let item = extract_item(&html, session.post_id.as_str()).map_err(|e| {
            warn!(strategy = self.name(), post_id = %session.post_id, error = %e, "no usable state blob");
            e
        })?;

        // Media hosts expect the page itself as referer
        let identity = identity.with_referer(Some(url));

        info!(strategy = self.name(), post_id = %session.post_id, "state blob extracted");
        Ok(RawPayload {
            strategy: self.name(),
            post_id: session.post_id.clone(),
            document: item,
            identity,
        })
    }
}
