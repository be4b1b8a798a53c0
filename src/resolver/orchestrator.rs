// PostResolver - the one entry point: locator in, ResolvedPost out
//
// Pipeline: locator -> session (redirects, cookie, post ID) -> chain of
// strategies -> normalized post. Each call is independent; the resolver only
// holds the HTTP client and configuration.

use reqwest::Client;
use tracing::{info, instrument};

use super::chain::ResolverChain;
use super::config::{ConfigError, ResolverConfig};
use super::errors::ResolutionFailure;
use super::http::build_client;
use super::locator::resolve_session;
use super::models::{MediaSize, PostMedia, ResolvedPost};
use super::normalizer::Normalizer;
use super::prober::SizeProber;
use super::strategies::{build_strategies, ResolverStrategy, StrategyContext};

pub struct PostResolver {
    client: Client,
    config: ResolverConfig,
    chain: ResolverChain,
}

impl PostResolver {
    /// Resolver with the strategies listed in `config.strategies`
    pub fn new(config: ResolverConfig) -> Result<Self, ConfigError> {
        let strategies = build_strategies(&config.strategies);
        Self::with_strategies(config, strategies)
    }

    /// Resolver with an explicit strategy list
    pub fn with_strategies(
        config: ResolverConfig,
        strategies: Vec<Box<dyn ResolverStrategy>>,
    ) -> Result<Self, ConfigError> {
        let client = build_client(&config)?;
        let chain = ResolverChain::new(
            strategies,
            Normalizer::new(config.watermark.clone()),
            config.strategy_timeout(),
        );
        info!(strategies = ?chain.strategy_names(), proxy = config.proxy.is_some(), "resolver ready");
        Ok(Self {
            client,
            config,
            chain,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// ResolvePost(locator) -> ResolvedPost | ResolutionFailure
    #[instrument(skip(self))]
    pub async fn resolve_post(&self, locator: &str) -> Result<ResolvedPost, ResolutionFailure> {
        let session = resolve_session(&self.client, &self.config, locator).await?;
        let ctx = StrategyContext::new(&self.client, &self.config);

        self.chain
            .resolve(ctx, &session)
            .await
            .map_err(|failures| failures.into_failure(&session.post_id))
    }

    /// Size estimate of the media a raw download would deliver
    pub async fn probe_size(&self, post: &ResolvedPost) -> MediaSize {
        let url = match &post.media {
            PostMedia::Video { selected, .. } => selected.url.as_str(),
            PostMedia::Gallery { images } => match images.first() {
                Some(image) => image.url.as_str(),
                None => return MediaSize::Unknown,
            },
        };
        SizeProber::new(&self.client, &self.config)
            .probe(url, &post.fetch_identity)
            .await
    }
}
