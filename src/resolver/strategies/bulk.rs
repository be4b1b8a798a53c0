// Bulk detail strategy - batch endpoint of the app surface, asked for one ID

use async_trait::async_trait;
use tracing::{debug, info};

use super::traits::{ResolverStrategy, StrategyContext};
use super::{device_params, fetch_json, find_by_aweme_id};
use crate::resolver::errors::StrategyError;
use crate::resolver::http::RequestIdentity;
use crate::resolver::models::{RawPayload, Session};

pub struct BulkStrategy;

#[async_trait]
impl ResolverStrategy for BulkStrategy {
    fn name(&self) -> &'static str {
        "bulk"
    }

    async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<RawPayload, StrategyError> {
        let url = ctx.config.endpoints.mobile("/aweme/v1/multi/aweme/detail/");
        let mut query = vec![("aweme_ids", format!("[{}]", session.post_id))];
        query.extend(device_params());
        let mut identity = RequestIdentity::mobile(ctx.config);

        debug!(strategy = self.name(), post_id = %session.post_id, "querying batch detail");
        let document = fetch_json(ctx, self.name(), &url, &query, &mut identity).await?;

        let item = find_by_aweme_id(document.get("aweme_details"), session.post_id.as_str())
            .ok_or_else(|| StrategyError::not_found("batch detail omitted the requested post"))?;

        info!(strategy = self.name(), post_id = %session.post_id, "batch item received");
        Ok(RawPayload {
            strategy: self.name(),
            post_id: session.post_id.clone(),
            document: item.clone(),
            identity,
        })
    }
}
