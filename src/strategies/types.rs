use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::platforms::PlatformId;

/// Overall shape of a resolved post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    ImageSet,
    Mixed,
}

/// Where the bytes of one media asset live.
///
/// `Local` paths are owned by the artifact manager from the moment they
/// are created. `Remote` is an inline-able URL the channel can fetch
/// itself. `Link` is a click-through fallback produced when an asset
/// cannot be delivered inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaLocation {
    Local(PathBuf),
    Remote(String),
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub location: MediaLocation,
    pub byte_size: u64,
    pub mime_kind: String,
}

impl MediaItem {
    pub fn local(path: PathBuf, byte_size: u64, mime_kind: impl Into<String>) -> Self {
        Self {
            location: MediaLocation::Local(path),
            byte_size,
            mime_kind: mime_kind.into(),
        }
    }

    pub fn remote(url: impl Into<String>, byte_size: u64, mime_kind: impl Into<String>) -> Self {
        Self {
            location: MediaLocation::Remote(url.into()),
            byte_size,
            mime_kind: mime_kind.into(),
        }
    }

    /// Link-only placeholder; carries no payload bytes.
    pub fn link(url: impl Into<String>) -> Self {
        Self {
            location: MediaLocation::Link(url.into()),
            byte_size: 0,
            mime_kind: mime::TEXT_PLAIN.to_string(),
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime().type_() == mime::VIDEO
    }

    pub fn is_fallback_link(&self) -> bool {
        matches!(self.location, MediaLocation::Link(_))
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        match &self.location {
            MediaLocation::Local(path) => Some(path),
            _ => None,
        }
    }

    pub fn mime(&self) -> mime::Mime {
        self.mime_kind
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
    }
}

/// A link resolved into deliverable media. Owned by the coordinator
/// until post-processing, which may replace `items` in place with a
/// size-conforming representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub platform_id: PlatformId,
    pub kind: MediaKind,
    pub items: Vec<MediaItem>,
    pub caption: Option<String>,
    pub source_url: String,
    pub resolved_at: DateTime<Utc>,
}
