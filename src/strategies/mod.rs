//! Fetch strategies: the interchangeable ways of turning a supported
//! URL into media, tried in per-platform order by the coordinator.

pub mod adapters;
pub mod http;
mod traits;
mod types;

pub use adapters::{
    AggregatorResolver, CookieResolver, OAuthResolver, OfficialResolver, ProxyResolver,
};
pub use traits::{FetchError, FetchStrategy, StrategyContext, StrategyKind};
pub use types::{MediaItem, MediaKind, MediaLocation, ResolvedMedia};
