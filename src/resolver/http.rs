// HTTP helpers shared by the locator, strategies, prober and delivery
//
// - one reqwest client per resolver, redirects disabled (the locator follows them itself)
// - RequestIdentity: user agent / referer / origin / cookie presented to an upstream
// - bounded retry with backoff for transient failures of a single call

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::config::{ConfigError, ResolverConfig, RetryPolicy};
use super::errors::StrategyError;

/// Identity headers presented to an upstream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: String,
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Value for the Cookie header ("a=1; b=2")
    pub cookie: Option<String>,
}

impl RequestIdentity {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::default()
        }
    }

    /// Browser identity
    pub fn desktop(config: &ResolverConfig) -> Self {
        Self::new(config.desktop_user_agent.clone())
    }

    /// App identity
    pub fn mobile(config: &ResolverConfig) -> Self {
        Self::new(config.mobile_user_agent.clone())
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|c| !c.is_empty());
        self
    }

    /// Merge Set-Cookie headers of a response into the carried cookie
    pub fn absorb_cookies(&mut self, headers: &HeaderMap) {
        self.cookie = merge_set_cookies(self.cookie.take(), headers);
    }

    /// Attach identity headers to a request
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder.header(USER_AGENT, self.user_agent.as_str());
        if let Some(referer) = &self.referer {
            builder = builder.header(REFERER, referer.as_str());
        }
        if let Some(origin) = &self.origin {
            builder = builder.header(ORIGIN, origin.as_str());
        }
        if let Some(cookie) = &self.cookie {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                builder = builder.header(COOKIE, value);
            }
        }
        builder
    }
}

/// Build the shared client: connect deadline, optional proxy, no automatic redirects
pub fn build_client(config: &ResolverConfig) -> Result<Client, ConfigError> {
    let mut builder = Client::builder()
        .connect_timeout(config.stream_connect_timeout())
        .redirect(reqwest::redirect::Policy::none());

    if let Some(proxy_url) = config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|_| ConfigError::InvalidProxy(proxy_url.to_string()))?;
        debug!(proxy = proxy_url, "using proxy");
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

/// Statuses worth retrying: rate limiting and server errors
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
}

/// Send a request, retrying transient failures with increasing backoff.
///
/// `make` rebuilds the request for each attempt. Non-retryable statuses are
/// returned as-is for the caller to classify; a retryable status that
/// survives every attempt becomes `StrategyError::Transient`.
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    label: &str,
    make: F,
) -> Result<Response, StrategyError>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = StrategyError::transient("no attempt made");

    for attempt in 1..=attempts {
        match make().send().await {
            Ok(resp) if is_retryable_status(resp.status()) => {
                let status = resp.status().as_u16();
                warn!(call = label, attempt, status, "retryable status");
                last_error = StrategyError::transient(format!("HTTP {}", status));
            }
            Ok(resp) => return Ok(resp),
            Err(e) if is_retryable_error(&e) => {
                warn!(call = label, attempt, error = %e, "transient request failure");
                last_error = StrategyError::transient(describe_reqwest_error(&e));
            }
            Err(e) => return Err(StrategyError::from(e)),
        }

        if attempt < attempts {
            let delay = policy.backoff(attempt);
            debug!(call = label, ?delay, "backing off before retry");
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error)
}

/// Read a body as text and reject empty bodies (a common soft block)
pub async fn read_text(resp: Response) -> Result<String, StrategyError> {
    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Err(StrategyError::transient("empty response body"));
    }
    Ok(text)
}

pub fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

/// Merge `Set-Cookie` headers into a Cookie header value, replacing by name
pub fn merge_set_cookies(existing: Option<String>, headers: &HeaderMap) -> Option<String> {
    let mut jar: Vec<(String, String)> = existing
        .as_deref()
        .map(parse_cookie_header)
        .unwrap_or_default();

    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let pair = raw.split(';').next().unwrap_or("").trim();
        let Some((name, val)) = pair.split_once('=') else { continue };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match jar.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = val.trim().to_string(),
            None => jar.push((name.to_string(), val.trim().to_string())),
        }
    }

    if jar.is_empty() {
        None
    } else {
        Some(
            jar.iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let (name, val) = part.trim().split_once('=')?;
            (!name.is_empty()).then(|| (name.to_string(), val.to_string()))
        })
        .collect()
}

/// Deadline helper for futures that are not reqwest requests
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StrategyError>
where
    F: std::future::Future<Output = Result<T, StrategyError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StrategyError::transient(format!(
            "deadline of {}s exceeded",
            deadline.as_secs_f32()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for c in cookies {
            map.append(SET_COOKIE, HeaderValue::from_str(c).unwrap());
        }
        map
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5,
        }
    }

    #[test]
    fn test_merge_set_cookies() {
        let merged = merge_set_cookies(
            Some("ttwid=old; msToken=abc".to_string()),
            &headers(&[
                "ttwid=new; Path=/; HttpOnly",
                "tt_chain_token=xyz; Max-Age=100",
            ]),
        );
        assert_eq!(
            merged.as_deref(),
            Some("ttwid=new; msToken=abc; tt_chain_token=xyz")
        );
    }

    #[test]
    fn test_merge_nothing() {
        assert_eq!(merge_set_cookies(None, &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/flaky", server.url());
        let result = send_with_retry(&fast_retry(2), "flaky", || client.get(&url)).await;

        assert!(matches!(result, Err(StrategyError::Transient(ref m)) if m == "HTTP 503"));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_retryable_status_returned_once() {
        let mut server = mockito::Server::new_async().await;
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/missing", server.url());
        let resp = send_with_retry(&fast_retry(3), "missing", || client.get(&url))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_identity_headers_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/whoami")
            .match_header("user-agent", "agent/1.0")
            .match_header("referer", "https://ref.example/")
            .match_header("cookie", "a=1")
            .with_status(200)
            .create_async()
            .await;

        let identity = RequestIdentity::new("agent/1.0")
            .with_referer(Some("https://ref.example/".to_string()))
            .with_cookie(Some("a=1".to_string()));
        let client = Client::new();
        let resp = identity
            .apply(client.get(format!("{}/whoami", server.url())))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        mock.assert_async().await;
    }
}
