//! URL detection and canonicalization

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::registry::PlatformRegistry;
use crate::strategies::http::HttpClient;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

/// Canonical form of a detected link: lowercased scheme/host, tracking
/// parameters stripped, fragment dropped, trailing slash removed. The
/// sole cache and deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query parameters that only carry attribution noise. Two shares of the
/// same post must collapse to one cache key.
fn is_tracking_param(key: &str) -> bool {
    key == "utm"
        || key.starts_with("utm_")
        || key.starts_with("spm")
        || key.starts_with("share_")
        || matches!(
            key,
            "si" | "fbclid" | "gclid" | "igsh" | "vd_source" | "xhsshare" | "from" | "refer_flag"
        )
}

/// Canonicalize a raw link. Idempotent: normalizing the output again
/// yields the same value.
pub fn normalize(raw: &str) -> Result<NormalizedUrl, MatchError> {
    let mut parsed = Url::parse(raw).map_err(|e| MatchError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MatchError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    if parsed.path().len() > 1 && parsed.path().ends_with('/') {
        let trimmed = parsed.path().trim_end_matches('/').to_string();
        parsed.set_path(&trimmed);
    }

    Ok(NormalizedUrl(parsed.into()))
}

/// Short-link hosts that must be expanded before the registry can see
/// the real platform.
const SHORT_HOSTS: &[&str] = &[
    "b23.tv",
    "t.co",
    "youtu.be",
    "xhslink.com",
    "vt.tiktok.com",
    "vm.tiktok.com",
    "v.douyin.com",
    "fb.watch",
];

fn is_short_host(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .is_some_and(|host| SHORT_HOSTS.iter().any(|s| host == *s))
}

/// Scans free text for the first supported platform link.
pub struct UrlMatcher {
    registry: Arc<PlatformRegistry>,
    /// Client for expanding short links; `None` disables expansion.
    http: Option<Arc<HttpClient>>,
    extract: Regex,
}

impl UrlMatcher {
    pub fn new(registry: Arc<PlatformRegistry>, http: Option<Arc<HttpClient>>) -> Self {
        let extract = Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#)
            .expect("url extraction pattern must compile");
        Self {
            registry,
            http,
            extract,
        }
    }

    /// First supported URL by position in the text, or `None` for a
    /// no-op. Short links are followed to their final location first;
    /// redirects landing on a not-found page are skipped.
    pub async fn find_supported_url(&self, text: &str) -> Option<NormalizedUrl> {
        for m in self.extract.find_iter(text) {
            let candidate = m.as_str().trim_end_matches([',', '.', ';', ')', ']', '"']);

            let expanded = self.expand(candidate).await;
            let target = expanded.as_deref().unwrap_or(candidate);

            let normalized = match normalize(target) {
                Ok(n) => n,
                Err(err) => {
                    debug!(candidate, %err, "skipping unparseable url");
                    continue;
                }
            };

            if self.registry.lookup(&normalized).is_some() {
                debug!(url = %normalized, "detected supported platform link");
                return Some(normalized);
            }
        }
        None
    }

    /// Follow a short link to its final URL. Returns `None` when the
    /// candidate is not a known short host, expansion is disabled, or
    /// the redirect target is unusable.
    async fn expand(&self, candidate: &str) -> Option<String> {
        if !is_short_host(candidate) {
            return None;
        }
        let http = self.http.as_ref()?;

        match http.final_url(candidate).await {
            Ok(resolved) => {
                if resolved.to_ascii_lowercase().contains("/notfound") {
                    warn!(candidate, "short link redirected to not-found page");
                    return None;
                }
                debug!(candidate, resolved, "expanded short link");
                Some(resolved)
            }
            Err(err) => {
                warn!(candidate, %err, "short link expansion failed, using original");
                None
            }
        }
    }
}
