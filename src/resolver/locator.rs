// Identifier extraction - follow redirects, then match post-ID patterns
//
// Shortened links (vm./vt. domains) only reveal the post ID after redirects.
// Redirects are followed by hand so that hops are bounded, each hop has its
// own deadline, and session cookies set along the way are kept for later
// strategies.

use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::config::ResolverConfig;
use super::errors::ResolutionFailure;
use super::http::{merge_set_cookies, send_with_retry, RequestIdentity};
use super::models::{ContentLocator, PostId, Session};

lazy_static::lazy_static! {
    /// /video/<id> or /photo/<id>
    static ref POST_PATH_RE: Regex = Regex::new(r"/(?:video|photo)/(\d+)").unwrap();
    /// /v/<id>(.html), used by share and mobile pages
    static ref SHORT_PATH_RE: Regex = Regex::new(r"/v/(\d+)").unwrap();
    /// Any long numeric token (item_id=..., share_item_id=..., bare IDs)
    static ref LONG_TOKEN_RE: Regex = Regex::new(r"(\d{15,})").unwrap();
}

/// Apply the extraction patterns in priority order; first match wins
pub fn extract_post_id(url: &str) -> Option<PostId> {
    [&*POST_PATH_RE, &*SHORT_PATH_RE, &*LONG_TOKEN_RE]
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| PostId::new(m.as_str()))
}

/// Outcome of following a locator's redirects
#[derive(Debug, Clone)]
pub struct FollowedLocator {
    pub final_url: String,
    pub cookie: Option<String>,
    pub hops: usize,
}

/// Follow redirects up to `config.max_redirects` hops, collecting cookies
pub async fn follow_redirects(
    client: &Client,
    config: &ResolverConfig,
    raw: &str,
) -> Result<FollowedLocator, ResolutionFailure> {
    let mut current =
        Url::parse(raw.trim()).map_err(|_| ResolutionFailure::InvalidLocator(raw.to_string()))?;
    if !matches!(current.scheme(), "http" | "https") {
        return Err(ResolutionFailure::InvalidLocator(raw.to_string()));
    }

    let identity = RequestIdentity::desktop(config);
    let mut cookie: Option<String> = None;

    for hop in 0..=config.max_redirects {
        let target = current.clone();
        let hop_identity = identity.clone().with_cookie(cookie.clone());
        let sent = send_with_retry(&config.retry, "redirect", || {
            hop_identity
                .apply(client.get(target.clone()))
                .timeout(config.redirect_timeout())
        })
        .await;

        let resp = match sent {
            Ok(resp) => resp,
            Err(e) if hop == 0 => {
                warn!(url = %target, error = %e, "redirect resolution failed");
                return Err(ResolutionFailure::InvalidLocator(format!("{} ({})", raw, e)));
            }
            Err(e) => {
                // The last Location reached usually already names the post
                warn!(url = %target, hops = hop, error = %e, "redirect target unreachable, keeping last location");
                return Ok(FollowedLocator {
                    final_url: current.to_string(),
                    cookie,
                    hops: hop,
                });
            }
        };

        cookie = merge_set_cookies(cookie, resp.headers());

        if !resp.status().is_redirection() {
            debug!(url = %current, hops = hop, "locator resolved");
            return Ok(FollowedLocator {
                final_url: current.to_string(),
                cookie,
                hops: hop,
            });
        }

        let Some(location) = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()) else {
            return Ok(FollowedLocator {
                final_url: current.to_string(),
                cookie,
                hops: hop,
            });
        };

        current = current
            .join(location)
            .map_err(|_| ResolutionFailure::InvalidLocator(location.to_string()))?;
        debug!(hop = hop + 1, to = %current, "following redirect");
    }

    warn!(max = config.max_redirects, url = %current, "redirect limit reached");
    Ok(FollowedLocator {
        final_url: current.to_string(),
        cookie,
        hops: config.max_redirects,
    })
}

/// Turn a user-supplied locator into a Session (locator, post ID, cookie).
///
/// When redirect resolution fails on the network the raw URL is still
/// searched for an ID, so canonical links keep working while the share
/// domain is unreachable.
pub async fn resolve_session(
    client: &Client,
    config: &ResolverConfig,
    raw: &str,
) -> Result<Session, ResolutionFailure> {
    let (locator, cookie) = match follow_redirects(client, config, raw).await {
        Ok(followed) => (ContentLocator::new(raw, followed.final_url), followed.cookie),
        Err(ResolutionFailure::InvalidLocator(detail)) if Url::parse(raw.trim()).is_ok() => {
            warn!(locator = raw, detail = %detail, "falling back to unresolved locator");
            (ContentLocator::unresolved(raw.trim()), None)
        }
        Err(e) => return Err(e),
    };

    let post_id = extract_post_id(&locator.resolved)
        .or_else(|| extract_post_id(&locator.raw))
        .ok_or_else(|| ResolutionFailure::InvalidLocator(locator.resolved.clone()))?;

    info!(post_id = %post_id, resolved = %locator.resolved, "post ID extracted");
    Ok(Session::new(locator, post_id).with_cookie(cookie))
}
