use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::matcher::NormalizedUrl;
use crate::config::PlatformOverride;
use crate::strategies::StrategyKind;

/// Closed set of supported platforms. Adding a platform means adding a
/// variant here plus a `(patterns, strategy order)` tuple in
/// [`PlatformRegistry::builtin`]; there is no ad hoc branching elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Douyin,
    Kuaishou,
    Bilibili,
    Youtube,
    Tiktok,
    Xiaohongshu,
    Twitter,
    Instagram,
    Facebook,
    Weibo,
    Tieba,
    Coolapk,
    Wechat,
}

impl PlatformId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Douyin => "douyin",
            Self::Kuaishou => "kuaishou",
            Self::Bilibili => "bilibili",
            Self::Youtube => "youtube",
            Self::Tiktok => "tiktok",
            Self::Xiaohongshu => "xiaohongshu",
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Weibo => "weibo",
            Self::Tieba => "tieba",
            Self::Coolapk => "coolapk",
            Self::Wechat => "wechat",
        }
    }

    pub fn all() -> &'static [PlatformId] {
        &[
            Self::Douyin,
            Self::Kuaishou,
            Self::Bilibili,
            Self::Youtube,
            Self::Tiktok,
            Self::Xiaohongshu,
            Self::Twitter,
            Self::Instagram,
            Self::Facebook,
            Self::Weibo,
            Self::Tieba,
            Self::Coolapk,
            Self::Wechat,
        ]
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(String);

impl FromStr for PlatformId {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformId::all()
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

/// Static description of one platform: URL shapes plus the authoritative
/// fallback order of its fetch strategies.
#[derive(Debug, Clone)]
pub struct PlatformDescriptor {
    pub platform_id: PlatformId,
    pub url_patterns: Vec<Regex>,
    pub strategy_order: Vec<StrategyKind>,
}

impl PlatformDescriptor {
    pub fn matches(&self, url: &NormalizedUrl) -> bool {
        self.url_patterns.iter().any(|p| p.is_match(url.as_str()))
    }
}

/// Read-only mapping from URL shape to platform descriptor, built once
/// at startup and shared process-wide.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    descriptors: Vec<PlatformDescriptor>,
}

/// Anchored pattern matching `https?://` plus any subdomain of the
/// given hosts. Path matching stays case-sensitive; hosts are matched
/// against the already-lowercased normalized form.
fn hosts_pattern(hosts: &[&str]) -> Regex {
    let alternatives = hosts
        .iter()
        .map(|h| regex::escape(h))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"^https?://(?:[a-z0-9-]+\.)*(?:{alternatives})(?::\d+)?(?:/|$)");
    Regex::new(&pattern).expect("builtin host pattern must compile")
}

impl PlatformRegistry {
    pub fn new(descriptors: Vec<PlatformDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The builtin platform table.
    ///
    /// Strategy order is deliberate per platform, not inferred from
    /// which credentials happen to be configured: platforms whose
    /// content is gated behind login try the cookie resolver first,
    /// platforms with a usable official resolver try that first, and
    /// the third-party aggregator is always the last resort.
    pub fn builtin() -> Self {
        use PlatformId::*;
        use StrategyKind::*;

        let table: Vec<(PlatformId, &[&str], Vec<StrategyKind>)> = vec![
            (Douyin, &["douyin.com", "iesdouyin.com"], vec![Official, Aggregator]),
            (Kuaishou, &["kuaishou.com"], vec![Cookie, Aggregator]),
            (Bilibili, &["bilibili.com", "b23.tv"], vec![Cookie, Official, Aggregator]),
            (Youtube, &["youtube.com", "youtu.be"], vec![Cookie, Proxy, Aggregator]),
            (Tiktok, &["tiktok.com"], vec![Proxy, Aggregator]),
            (Xiaohongshu, &["xiaohongshu.com", "xhslink.com"], vec![Cookie, Proxy, Aggregator]),
            (Twitter, &["twitter.com", "x.com"], vec![Cookie, Oauth, Aggregator]),
            (Instagram, &["instagram.com"], vec![Cookie, Oauth, Aggregator]),
            (Facebook, &["facebook.com", "fb.watch"], vec![Proxy, Aggregator]),
            (Weibo, &["weibo.com", "weibo.cn"], vec![Cookie, Aggregator]),
            (Tieba, &["tieba.baidu.com"], vec![Cookie, Aggregator]),
            (Coolapk, &["coolapk.com"], vec![Proxy, Aggregator]),
            (Wechat, &["mp.weixin.qq.com"], vec![Proxy, Aggregator]),
        ];

        let descriptors = table
            .into_iter()
            .map(|(platform_id, hosts, strategy_order)| PlatformDescriptor {
                platform_id,
                url_patterns: vec![hosts_pattern(hosts)],
                strategy_order,
            })
            .collect();

        Self { descriptors }
    }

    /// Builtin table with per-deployment strategy order overrides
    /// applied. Overrides are validated against the platform set at
    /// config load time.
    pub fn with_overrides(overrides: &HashMap<String, PlatformOverride>) -> Self {
        let mut registry = Self::builtin();
        for descriptor in &mut registry.descriptors {
            if let Some(over) = overrides.get(descriptor.platform_id.as_str()) {
                if !over.strategy_order.is_empty() {
                    descriptor.strategy_order = over.strategy_order.clone();
                }
            }
        }
        registry
    }

    /// Pure lookup; `None` means `unsupported_platform`, a terminal
    /// non-retryable outcome for the caller.
    pub fn lookup(&self, url: &NormalizedUrl) -> Option<&PlatformDescriptor> {
        self.descriptors.iter().find(|d| d.matches(url))
    }

    pub fn descriptors(&self) -> &[PlatformDescriptor] {
        &self.descriptors
    }
}
