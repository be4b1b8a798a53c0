// Web API strategy - browser identity against the JSON item detail endpoint

use async_trait::async_trait;
use tracing::{debug, info};

use super::traits::{ResolverStrategy, StrategyContext};
use super::fetch_json;
use crate::resolver::errors::StrategyError;
use crate::resolver::http::RequestIdentity;
use crate::resolver::models::{RawPayload, Session};

pub struct WebStrategy;

impl WebStrategy {
    /// Browser identity with the session cookie and a same-site referer
    fn identity(ctx: StrategyContext<'_>, session: &Session) -> RequestIdentity {
        let base = ctx.config.endpoints.web("/");
        RequestIdentity::desktop(ctx.config)
            .with_referer(Some(base.clone()))
            .with_origin(Some(base.trim_end_matches('/').to_string()))
            .with_cookie(session.cookie.clone())
    }
}

#[async_trait]
impl ResolverStrategy for WebStrategy {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<RawPayload, StrategyError> {
        let url = ctx.config.endpoints.web("/api/item/detail/");
        let query = [
            ("itemId", session.post_id.to_string()),
            ("aid", "1988".to_string()),
        ];
        let mut identity = Self::identity(ctx, session);

        debug!(strategy = self.name(), post_id = %session.post_id, "querying item detail");
        let document = fetch_json(ctx, self.name(), &url, &query, &mut identity).await?;

        if document.pointer("/itemInfo/itemStruct").is_none() {
            return Err(StrategyError::not_found("item detail has no itemStruct"));
        }

        info!(strategy = self.name(), post_id = %session.post_id, "item detail received");
        Ok(RawPayload {
            strategy: self.name(),
            post_id: session.post_id.clone(),
            document,
            identity,
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

    fn session() -> Session {
        Session::new(
            ContentLocator::unresolved("https://www.tiktok.com/@u/video/7300000000000000001"),
            PostId::new("7300000000000000001"),
        )
        .with_cookie(Some("ttwid=abc".to_string()))
    }

    #[tokio::test]
    async fn test_web_returns_item_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/item/detail/")
            .match_query(Matcher::UrlEncoded("itemId".into(), "7300000000000000001".into()))
            .match_header("cookie", "ttwid=abc")
            .with_status(200)
            .with_header("set-cookie", "msToken=xyz; Path=/")
            .with_body(r#"{"statusCode":0,"itemInfo":{"itemStruct":{"id":"7300000000000000001"}}}"#)
            .create_async()
            .await;

        let config = ResolverConfig::default()
            .with_base_url(&server.url())
            .with_retry(RetryPolicy::none());
        let client = build_client(&config).unwrap();
        let payload = WebStrategy
            .resolve(StrategyContext::new(&client, &config), &session())
            .await
            .unwrap();

        assert_eq!(payload.strategy, "web");
        assert_eq!(payload.identity.cookie.as_deref(), Some("ttwid=abc; msToken=xyz"));
        assert!(payload.document.pointer("/itemInfo/itemStruct/id").is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_web_deleted_post_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/item/detail/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"statusCode":10204,"statusMsg":"item doesn't exist"}"#)
            .create_async()
            .await;

        let config = ResolverConfig::default()
            .with_base_url(&server.url())
            .with_retry(RetryPolicy::none());
        let client = build_client(&config).unwrap();
        let err = WebStrategy
            .resolve(StrategyContext::new(&client, &config), &session())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_web_html_instead_of_json_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/item/detail/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>verify you are human</html>")
            .create_async()
            .await;

        let config = ResolverConfig::default()
            .with_base_url(&server.url())
            .with_retry(RetryPolicy::none());
        let client = build_client(&config).unwrap();
        let err = WebStrategy
            .resolve(StrategyContext::new(&client, &config), &session())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Malformed(_)));
    }
}
