//! Delivery packaging: turn adapted media into the ordered list of
//! sendable items a channel frontend can walk without further logic.

use serde::Serialize;

use crate::strategies::{MediaItem, ResolvedMedia};

/// Caption length most chat channels accept on a media message.
const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryItem {
    pub item: MediaItem,
    /// Present on the first item only, so an album renders one caption.
    pub caption: Option<String>,
    /// True when this item is a bare link standing in for media the
    /// pipeline could not deliver inline.
    pub is_fallback_link: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryPlan {
    pub items: Vec<DeliveryItem>,
    /// True when any item fell back to a bare link.
    pub degraded: bool,
}

/// Build the delivery plan for adapted media. Media with no items at
/// all becomes a single link back to the source page.
pub fn package(media: &ResolvedMedia) -> DeliveryPlan {
    let caption = media.caption.clone();

    if media.items.is_empty() {
        return DeliveryPlan {
            items: vec![DeliveryItem {
                item: MediaItem::link(&media.source_url),
                caption,
                is_fallback_link: true,
            }],
            degraded: true,
        };
    }

    let degraded = media.items.iter().any(MediaItem::is_fallback_link);
    let items = media
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| DeliveryItem {
            item: item.clone(),
            caption: if index == 0 { caption.clone() } else { None },
            is_fallback_link: item.is_fallback_link(),
        })
        .collect();

    DeliveryPlan { items, degraded }
}

/// Merge a post's title and description into one caption. A
/// description that already restates the title wins outright; the
/// result is truncated on a char boundary to the channel limit.
pub fn compose_caption(title: Option<&str>, description: Option<&str>) -> Option<String> {
    let title = title.map(str::trim).filter(|s| !s.is_empty());
    let description = description.map(str::trim).filter(|s| !s.is_empty());

    let composed = match (title, description) {
        (Some(t), Some(d)) if d.starts_with(t) => d.to_string(),
        (Some(t), Some(d)) => format!("{t}\n{d}"),
        (Some(t), None) => t.to_string(),
        (None, Some(d)) => d.to_string(),
        (None, None) => return None,
    };

    if composed.chars().count() <= CAPTION_LIMIT {
        return Some(composed);
    }
    Some(composed.chars().take(CAPTION_LIMIT).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::PlatformId;
    use crate::strategies::{MediaKind, MediaLocation};
    use chrono::Utc;
    use std::path::PathBuf;

    fn media(items: Vec<MediaItem>, caption: Option<&str>) -> ResolvedMedia {
        ResolvedMedia {
            platform_id: PlatformId::Xiaohongshu,
            kind: MediaKind::ImageSet,
            items,
            caption: caption.map(str::to_string),
            source_url: "https://www.xiaohongshu.com/explore/1".to_string(),
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn caption_lands_on_first_item_only() {
        let media = media(
            vec![
                MediaItem::local(PathBuf::from("/tmp/1.jpg"), 100, "image/jpeg"),
                MediaItem::local(PathBuf::from("/tmp/2.jpg"), 100, "image/jpeg"),
                MediaItem::local(PathBuf::from("/tmp/3.jpg"), 100, "image/jpeg"),
            ],
            Some("three photos"),
        );

        let plan = package(&media);
        assert_eq!(plan.items.len(), 3);
        assert_eq!(plan.items[0].caption.as_deref(), Some("three photos"));
        assert!(plan.items[1].caption.is_none());
        assert!(plan.items[2].caption.is_none());
        assert!(!plan.degraded);
    }

    #[test]
    fn any_link_item_marks_the_plan_degraded() {
        let media = media(
            vec![
                MediaItem::local(PathBuf::from("/tmp/1.jpg"), 100, "image/jpeg"),
                MediaItem::link("https://www.xiaohongshu.com/explore/1"),
            ],
            None,
        );
        let plan = package(&media);
        assert!(plan.degraded);
        assert!(!plan.items[0].is_fallback_link);
        assert!(plan.items[1].is_fallback_link);
    }

    #[test]
    fn empty_media_becomes_a_source_link() {
        let media = media(vec![], Some("text only post"));
        let plan = package(&media);

        assert!(plan.degraded);
        assert_eq!(plan.items.len(), 1);
        assert!(plan.items[0].is_fallback_link);
        assert!(plan.items[0].item.is_fallback_link());
        assert_eq!(
            plan.items[0].item.location,
            MediaLocation::Link("https://www.xiaohongshu.com/explore/1".to_string())
        );
        assert_eq!(plan.items[0].caption.as_deref(), Some("text only post"));
    }

    #[test]
    fn caption_composition_deduplicates_overlap() {
        assert_eq!(
            compose_caption(Some("Title"), Some("Title and more")).as_deref(),
            Some("Title and more")
        );
        assert_eq!(
            compose_caption(Some("Title"), Some("Body")).as_deref(),
            Some("Title\nBody")
        );
        assert_eq!(compose_caption(Some("  "), None), None);
        assert_eq!(compose_caption(None, Some("Body")).as_deref(), Some("Body"));
    }

    #[test]
    fn caption_truncates_on_char_boundary() {
        let long: String = "字".repeat(2000);
        let caption = compose_caption(Some(&long), None).unwrap();
        assert_eq!(caption.chars().count(), 1024);
    }
}
