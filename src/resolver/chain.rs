// Resolver chain - sequential fallback across strategies
//
// Strategies run one at a time in priority order. The first payload that also
// normalizes wins; every failure is recorded so an exhausted chain reports
// exactly one entry per strategy tried, in order.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::{ChainError, ResolutionError, StrategyError};
use super::http::with_deadline;
use super::models::{ResolvedPost, Session};
use super::normalizer::Normalizer;
use super::strategies::{ResolverStrategy, StrategyContext};

pub struct ResolverChain {
    strategies: Vec<Box<dyn ResolverStrategy>>,
    normalizer: Normalizer,
    /// Deadline of one strategy, its internal retries included
    strategy_deadline: Duration,
}

impl ResolverChain {
    pub fn new(
        strategies: Vec<Box<dyn ResolverStrategy>>,
        normalizer: Normalizer,
        strategy_deadline: Duration,
    ) -> Self {
        Self {
            strategies,
            normalizer,
            strategy_deadline,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy in turn; short-circuit on the first success
    pub async fn resolve(
        &self,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<ResolvedPost, ChainError> {
        let mut failures = ChainError::default();

        for strategy in &self.strategies {
            let name = strategy.name();
            debug!(strategy = name, post_id = %session.post_id, "trying strategy");

            match self.attempt(strategy.as_ref(), ctx, session).await {
                Ok(post) => {
                    info!(
                        strategy = name,
                        post_id = %session.post_id,
                        kind = post.kind().label(),
                        failed_before = failures.len(),
                        "post resolved"
                    );
                    return Ok(post);
                }
                Err(e) => {
                    warn!(strategy = name, post_id = %session.post_id, kind = e.kind(), error = %e, "strategy failed");
                    failures.attempts.push(ResolutionError::new(name, &e));
                }
            }
        }

        warn!(post_id = %session.post_id, attempts = failures.len(), "all strategies failed");
        Err(failures)
    }

    async fn attempt(
        &self,
        strategy: &dyn ResolverStrategy,
        ctx: StrategyContext<'_>,
        session: &Session,
    ) -> Result<ResolvedPost, StrategyError> {
        let payload = with_deadline(self.strategy_deadline, strategy.resolve(ctx, session)).await?;
        self.normalizer.normalize(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::config::ResolverConfig;
    use crate::resolver::http::RequestIdentity;
    use crate::resolver::models::{ContentLocator, PostId, RawPayload};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Outcome {
        Fail(StrategyError),
        Succeed(Value),
        Hang,
    }

    struct MockStrategy {
        name: &'static str,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
    }

    impl MockStrategy {
        fn boxed(name: &'static str, outcome: Outcome, calls: &Arc<AtomicUsize>) -> Box<dyn ResolverStrategy> {
            Box::new(Self {
                name,
                outcome,
                calls: Arc::clone(calls),
            })
        }
    }

    #[async_trait]
    impl ResolverStrategy for MockStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(
            &self,
            _ctx: StrategyContext<'_>,
            session: &Session,
        ) -> Result<RawPayload, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Outcome::Fail(e) => Err(e.clone()),
                Outcome::Succeed(doc) => Ok(RawPayload {
                    strategy: self.name,
                    post_id: session.post_id.clone(),
                    document: doc.clone(),
                    identity: RequestIdentity::default(),
                }),
                Outcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(StrategyError::transient("unreachable"))
                }
            }
        }
    }

    fn session() -> Session {
        Session::new(
            ContentLocator::unresolved("https://example/video/123456789012345"),
            PostId::new("123456789012345"),
        )
    }

    fn video_doc() -> Value {
        json!({"id": "123456789012345", "video": {"playAddr": "https://cdn.example/v.mp4"}})
    }

    fn chain(strategies: Vec<Box<dyn ResolverStrategy>>) -> ResolverChain {
        ResolverChain::new(strategies, Normalizer::default(), Duration::from_millis(200))
    }

    async fn run(chain: &ResolverChain) -> Result<ResolvedPost, ChainError> {
        let config = ResolverConfig::default();
        let client = reqwest::Client::new();
        chain.resolve(StrategyContext::new(&client, &config), &session()).await
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let third_calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            MockStrategy::boxed("a", Outcome::Fail(StrategyError::transient("timeout")), &calls),
            MockStrategy::boxed("b", Outcome::Succeed(video_doc()), &calls),
            MockStrategy::boxed("c", Outcome::Succeed(video_doc()), &third_calls),
        ]);

        let post = run(&chain).await.unwrap();
        assert_eq!(post.source, "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_reports_each_attempt_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            MockStrategy::boxed("web", Outcome::Fail(StrategyError::transient("HTTP 503")), &calls),
            MockStrategy::boxed("mobile", Outcome::Fail(StrategyError::not_found("deleted")), &calls),
            MockStrategy::boxed("html", Outcome::Fail(StrategyError::malformed("no blob")), &calls),
        ]);

        let err = run(&chain).await.unwrap_err();
        let names: Vec<&str> = err.attempts.iter().map(|a| a.strategy.as_str()).collect();
        assert_eq!(names, vec!["web", "mobile", "html"]);
        assert_eq!(err.attempts[1].kind, "not_found");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hanging_strategy_is_bounded_by_deadline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            MockStrategy::boxed("slow", Outcome::Hang, &calls),
            MockStrategy::boxed("fast", Outcome::Succeed(video_doc()), &calls),
        ]);

        let post = run(&chain).await.unwrap();
        assert_eq!(post.source, "fast");
    }

    #[tokio::test]
    async fn test_unnormalizable_payload_counts_as_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = chain(vec![
            MockStrategy::boxed("empty", Outcome::Succeed(json!({"id": "1"})), &calls),
            MockStrategy::boxed("good", Outcome::Succeed(video_doc()), &calls),
        ]);

        let post = run(&chain).await.unwrap();
        assert_eq!(post.source, "good");
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let err = run(&chain(Vec::new())).await.unwrap_err();
        assert!(err.is_empty());
    }
}
