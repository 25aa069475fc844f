//! Platform registry and URL detection

mod matcher;
mod registry;

pub use matcher::{MatchError, NormalizedUrl, UrlMatcher, normalize};
pub use registry::{PlatformDescriptor, PlatformId, PlatformRegistry, UnknownPlatform};
