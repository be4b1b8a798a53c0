// ResolverStrategy trait and the context every strategy runs with

use async_trait::async_trait;
use reqwest::Client;

use crate::resolver::config::ResolverConfig;
use crate::resolver::errors::StrategyError;
use crate::resolver::models::{RawPayload, Session};

/// Shared, read-only resources for one resolution
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub client: &'a Client,
    pub config: &'a ResolverConfig,
}

impl<'a> StrategyContext<'a> {
    pub fn new(client: &'a Client, config: &'a ResolverConfig) -> Self {
        Self { client, config }
    }
}

/// One upstream surface capable of producing a raw payload for a post ID
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    /// Name of the strategy (for logging and aggregate diagnostics)
    fn name(&self) -> &'static str;

    /// Query the upstream for `session.post_id`.
    ///
    /// Network calls inside retry on their own; the strategy itself is
    /// attempted once per chain run.
    async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<RawPayload, StrategyError>;
}
