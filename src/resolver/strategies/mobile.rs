// Mobile API strategy - app identity against the feed endpoint
//
// The feed answers with *some* post whenever it cannot serve the requested
// one, so the first entry must carry the requested ID. A mismatch says nothing
// about the post itself and is treated as a transient miss.

use async_trait::async_trait;
use tracing::{debug, info};

use super::traits::{ResolverStrategy, StrategyContext};
use super::{aweme_id_matches, device_params, fetch_json};
use crate::resolver::errors::StrategyError;
use crate::resolver::http::RequestIdentity;
use crate::resolver::models::{RawPayload, Session};

pub struct MobileStrategy;

#[async_trait]
impl ResolverStrategy for MobileStrategy {
    fn name(&self) -> &'static str {
        "mobile"
    }

    async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<RawPayload, StrategyError> {
        let url = ctx.config.endpoints.mobile("/aweme/v1/feed/");
        let mut query = vec![("aweme_id", session.post_id.to_string())];
        query.extend(device_params());
        let mut identity = RequestIdentity::mobile(ctx.config);

        debug!(strategy = self.name(), post_id = %session.post_id, "querying feed");
        let document = fetch_json(ctx, self.name(), &url, &query, &mut identity).await?;

        let item = document
            .pointer("/aweme_list/0")
            .filter(|first| aweme_id_matches(first, session.post_id.as_str()))
            .ok_or_else(|| StrategyError::transient("feed returned an unrelated post"))?;

        info!(strategy = self.name(), post_id = %session.post_id, "feed item received");
        Ok(RawPayload {
            strategy: self.name(),
            post_id: session.post_id.clone(),
            document: item.clone(),
            identity,
        })
    }
}
