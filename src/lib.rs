pub mod delivery;
pub mod resolver;

pub use delivery::{
    describe, open_media, select_target, DeliveryIntent, ErrorResponse, MediaDownload,
    MetadataResponse,
};
pub use resolver::{
    MediaSize, PostKind, PostResolver, ResolutionFailure, ResolvedPost, ResolverConfig,
    StrategyKind,
};
