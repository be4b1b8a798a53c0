// Resolver module - multi-strategy post resolution
//
// locator -> post ID -> chain of upstream strategies -> normalized post
//
// Strategies are interchangeable units behind one trait; adding, removing or
// reordering them never touches the normalizer.

pub mod chain;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod http;
pub mod locator;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod prober;
pub mod strategies;

pub use config::{ConfigError, Endpoints, ResolverConfig, RetryPolicy, StrategyKind, WatermarkRule};
pub use errors::{ChainError, ResolutionError, ResolutionFailure, StrategyError};
pub use http::RequestIdentity;
pub use models::{
    ContentLocator, ImageItem, MediaSize, MediaVariant, PostId, PostKind, PostMedia, PostStats,
    ResolvedPost,
};
pub use orchestrator::PostResolver;
pub use strategies::{ResolverStrategy, StrategyContext};
