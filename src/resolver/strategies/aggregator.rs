// Aggregator strategy - third-party resolver, last resort
//
// Takes the locator rather than the post ID. Media paths in its answer may be
// relative to the aggregator host; they are made absolute here so the
// normalizer only sees full URLs.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::fetch_json;
use super::traits::{ResolverStrategy, StrategyContext};
use crate::resolver::errors::StrategyError;
use crate::resolver::http::RequestIdentity;
use crate::resolver::models::{RawPayload, Session};

const MEDIA_FIELDS: &[&str] = &["play", "hdplay", "wmplay", "music", "cover", "origin_cover"];

pub struct AggregatorStrategy;

/// Rewrite host-relative media paths against the aggregator base
fn absolutize_media(data: &mut Value, base: &str) {
    let Ok(base) = Url::parse(base) else { return };
    let Some(obj) = data.as_object_mut() else { return };

    for field in MEDIA_FIELDS {
        if let Some(Value::String(path)) = obj.get_mut(*field) {
            if path.starts_with('/') && !path.starts_with("//") {
                if let Ok(full) = base.join(path) {
                    *path = full.to_string();
                }
            }
        }
    }
}

#[async_trait]
impl ResolverStrategy for AggregatorStrategy {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<RawPayload, StrategyError> {
        let url = ctx.config.endpoints.aggregator("/api/");
        let query = [
            ("url", session.locator.resolved.clone()),
            ("hd", "1".to_string()),
        ];
        let mut identity = RequestIdentity::desktop(ctx.config);

        debug!(strategy = self.name(), post_id = %session.post_id, "querying aggregator");
        let mut document = fetch_json(ctx, self.name(), &url, &query, &mut identity).await?;

        let data = document
            .get_mut("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| StrategyError::malformed("aggregator answer has no data object"))?;
        absolutize_media(data, &ctx.config.endpoints.aggregator_base);

        info!(strategy = self.name(), post_id = %session.post_id, "aggregator answered");
        Ok(RawPayload {
            strategy: self.name(),
            post_id: session.post_id.clone(),
            document,
            // Aggregator-hosted media is fetched without upstream cookies
            identity: identity.with_cookie(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::config::{ResolverConfig, RetryPolicy};
    use crate::resolver::http::build_client;
    use crate::resolver::models::{ContentLocator, PostId};
    use mockito::Matcher;
    use serde_json::json;

    fn session() -> Session {
        Session::new(
            ContentLocator::unresolved("https://www.tiktok.com/@u/video/7300000000000000001"),
            PostId::new("7300000000000000001"),
        )
    }

    #[test]
    fn test_absolutize_relative_paths() {
        let mut data = json!({
            "play": "/video/media/play/7300000000000000001.mp4",
            "hdplay": "https://cdn.example/hd.mp4",
            "title": "/not/a/media/field"
        });
        absolutize_media(&mut data, "https://agg.example");
        assert_eq!(data["play"], "https://agg.example/video/media/play/7300000000000000001.mp4");
        assert_eq!(data["hdplay"], "https://cdn.example/hd.mp4");
        assert_eq!(data["title"], "/not/a/media/field");
    }

    #[tokio::test]
    async fn test_aggregator_sends_locator() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "url".into(),
                    "https://www.tiktok.com/@u/video/7300000000000000001".into(),
                ),
                Matcher::UrlEncoded("hd".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"code":0,"msg":"success","data":{"id":"7300000000000000001","play":"/v/p.mp4"}}"#)
            .create_async()
            .await;

        let config = ResolverConfig::default()
            .with_base_url(&server.url())
            .with_retry(RetryPolicy::none());
        let client = build_client(&config).unwrap();
        let payload = AggregatorStrategy
            .resolve(StrategyContext::new(&client, &config), &session())
            .await
            .unwrap();

        assert_eq!(
            payload.document["data"]["play"],
            format!("{}/v/p.mp4", server.url())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_aggregator_parse_failure_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":-1,"msg":"Url parsing is failed! Please check url."}"#)
            .create_async()
            .await;

        let config = ResolverConfig::default()
            .with_base_url(&server.url())
            .with_retry(RetryPolicy::none());
        let client = build_client(&config).unwrap();
        let err = AggregatorStrategy
            .resolve(StrategyContext::new(&client, &config), &session())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
