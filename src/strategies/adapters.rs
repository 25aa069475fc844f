//! The five resolver adapters.
//!
//! Every adapter talks to an external resolver service over the same
//! JSON contract and differs only in which endpoint it calls and what
//! auth material it attaches. Media URLs in the response are
//! downloaded into the request's artifact directory; if a download
//! fails the remote URL is kept so delivery can still inline it.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{
    AggregatorCredentials, CookieCredentials, OAuthCredentials, OfficialCredentials,
    ProxyCredentials,
};
use crate::delivery::compose_caption;
use crate::platforms::{NormalizedUrl, PlatformId};
use crate::strategies::http::{HttpClient, HttpError};
use crate::strategies::traits::{FetchError, FetchStrategy, StrategyContext, StrategyKind};
use crate::strategies::types::{MediaItem, MediaKind, ResolvedMedia};

/// Response body shared by all resolver services.
#[derive(Debug, Deserialize)]
struct ResolvePayload {
    kind: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    media: Vec<MediaEntry>,
}

#[derive(Debug, Deserialize)]
struct MediaEntry {
    url: String,
    #[serde(default)]
    mime: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

fn map_http_err(err: HttpError) -> FetchError {
    match err {
        HttpError::Timeout => FetchError::Timeout,
        HttpError::Status(404) | HttpError::Status(410) => FetchError::NotFound,
        HttpError::Status(401) | HttpError::Status(403) => {
            FetchError::AccessDenied("rejected by upstream".to_string())
        }
        HttpError::Status(code) if code >= 500 => {
            FetchError::Network(format!("upstream returned HTTP {code}"))
        }
        HttpError::Status(code) => FetchError::Unparseable(format!("unexpected HTTP {code}")),
        HttpError::RequestFailed(msg) => FetchError::Network(msg),
        HttpError::InvalidUrl(msg) => FetchError::Unparseable(msg),
        HttpError::Io(err) => FetchError::Network(err.to_string()),
    }
}

fn parse_kind(raw: &str) -> Result<MediaKind, FetchError> {
    match raw {
        "video" => Ok(MediaKind::Video),
        "image" | "images" | "image_set" => Ok(MediaKind::ImageSet),
        "mixed" => Ok(MediaKind::Mixed),
        other => Err(FetchError::Unparseable(format!(
            "unknown media kind {other:?}"
        ))),
    }
}

fn extension_for(mime_kind: &str) -> &'static str {
    match mime_kind {
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        _ => ".bin",
    }
}

/// Referer/Origin pairs some platforms require before serving media.
fn platform_headers(platform: PlatformId) -> Vec<(String, String)> {
    let pair = match platform {
        PlatformId::Bilibili => Some(("https://www.bilibili.com/", "https://www.bilibili.com")),
        PlatformId::Youtube => Some(("https://www.youtube.com/", "https://www.youtube.com")),
        PlatformId::Twitter => Some(("https://x.com/", "https://x.com")),
        PlatformId::Tiktok => Some(("https://www.tiktok.com/", "https://www.tiktok.com")),
        PlatformId::Xiaohongshu => {
            Some(("https://www.xiaohongshu.com/", "https://www.xiaohongshu.com"))
        }
        _ => None,
    };
    match pair {
        Some((referer, origin)) => vec![
            ("Referer".to_string(), referer.to_string()),
            ("Origin".to_string(), origin.to_string()),
        ],
        None => Vec::new(),
    }
}

/// Call a resolver endpoint and turn its payload into local media.
async fn resolve_remote(
    http: &HttpClient,
    endpoint: &str,
    url: &NormalizedUrl,
    headers: Vec<(String, String)>,
    bearer: Option<&str>,
    ctx: &StrategyContext,
) -> Result<ResolvedMedia, FetchError> {
    let request_url = Url::parse_with_params(endpoint, &[("url", url.as_str())])
        .map_err(|e| FetchError::Unparseable(format!("bad endpoint: {e}")))?;

    debug!(platform = %ctx.platform, endpoint, "querying resolver");
    let value = http
        .get_json(request_url, &headers, bearer)
        .await
        .map_err(map_http_err)?;
    let payload: ResolvePayload = serde_json::from_value(value)
        .map_err(|e| FetchError::Unparseable(format!("bad resolver payload: {e}")))?;

    materialize(http, payload, url, ctx).await
}

async fn materialize(
    http: &HttpClient,
    payload: ResolvePayload,
    url: &NormalizedUrl,
    ctx: &StrategyContext,
) -> Result<ResolvedMedia, FetchError> {
    let kind = parse_kind(&payload.kind)?;
    let caption = compose_caption(payload.title.as_deref(), payload.description.as_deref());

    let mut items = Vec::with_capacity(payload.media.len());
    for entry in payload.media {
        let mime_kind = entry
            .mime
            .clone()
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let name = format!("{}-{}{}", ctx.request_id, Uuid::new_v4(), extension_for(&mime_kind));
        let dest = ctx.download_dir.join(name);

        match http.download_to(&entry.url, &dest).await {
            Ok(written) => {
                ctx.artifacts.register(&dest, ctx.request_id);
                items.push(MediaItem::local(dest, written, mime_kind));
            }
            Err(err) => {
                // keep the remote URL, the channel may inline it itself
                warn!(url = %entry.url, error = %err, "media download failed, keeping remote URL");
                items.push(MediaItem::remote(entry.url, entry.size.unwrap_or(0), mime_kind));
            }
        }
    }

    Ok(ResolvedMedia {
        platform_id: ctx.platform,
        kind,
        items,
        caption,
        source_url: url.to_string(),
        resolved_at: Utc::now(),
    })
}

/// Per-platform official endpoints, no auth.
pub struct OfficialResolver {
    http: Arc<HttpClient>,
    endpoints: HashMap<String, String>,
}

impl OfficialResolver {
    pub fn new(http: Arc<HttpClient>, creds: &OfficialCredentials) -> Self {
        Self {
            http,
            endpoints: creds.endpoints.clone(),
        }
    }
}

#[async_trait]
impl FetchStrategy for OfficialResolver {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Official
    }

    fn is_configured(&self, platform: PlatformId) -> bool {
        self.endpoints.contains_key(platform.as_str())
    }

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError> {
        let endpoint = self
            .endpoints
            .get(ctx.platform.as_str())
            .ok_or_else(|| FetchError::Unparseable("no official endpoint".to_string()))?;
        resolve_remote(&self.http, endpoint, url, Vec::new(), None, ctx).await
    }
}

/// Shared endpoint authenticated with a bearer token.
pub struct OAuthResolver {
    http: Arc<HttpClient>,
    endpoint: Option<String>,
    token: Option<String>,
}

impl OAuthResolver {
    pub fn new(http: Arc<HttpClient>, creds: &OAuthCredentials) -> Self {
        Self {
            http,
            endpoint: creds.endpoint.clone(),
            token: creds.token.clone(),
        }
    }
}

#[async_trait]
impl FetchStrategy for OAuthResolver {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Oauth
    }

    fn is_configured(&self, _platform: PlatformId) -> bool {
        self.endpoint.is_some() && self.token.is_some()
    }

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| FetchError::Unparseable("no oauth endpoint".to_string()))?;
        resolve_remote(&self.http, endpoint, url, Vec::new(), self.token.as_deref(), ctx).await
    }
}

/// Shared endpoint that forwards a per-platform cookie jar plus the
/// Referer/Origin pair the platform expects.
pub struct CookieResolver {
    http: Arc<HttpClient>,
    endpoint: Option<String>,
    cookies: HashMap<String, String>,
}

impl CookieResolver {
    pub fn new(http: Arc<HttpClient>, creds: &CookieCredentials) -> Self {
        Self {
            http,
            endpoint: creds.endpoint.clone(),
            cookies: creds.cookies.clone(),
        }
    }
}

#[async_trait]
impl FetchStrategy for CookieResolver {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cookie
    }

    fn is_configured(&self, platform: PlatformId) -> bool {
        self.endpoint.is_some() && self.cookies.contains_key(platform.as_str())
    }

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| FetchError::Unparseable("no cookie endpoint".to_string()))?;
        let cookie = self
            .cookies
            .get(ctx.platform.as_str())
            .ok_or_else(|| FetchError::AccessDenied("no cookie for platform".to_string()))?;

        let mut headers = platform_headers(ctx.platform);
        headers.push(("Cookie".to_string(), cookie.clone()));
        resolve_remote(&self.http, endpoint, url, headers, None, ctx).await
    }
}

/// Anti-crawler front that proxies the platform on our behalf.
pub struct ProxyResolver {
    http: Arc<HttpClient>,
    base: Option<String>,
}

impl ProxyResolver {
    pub fn new(http: Arc<HttpClient>, creds: &ProxyCredentials) -> Self {
        Self {
            http,
            base: creds.base.clone(),
        }
    }
}

#[async_trait]
impl FetchStrategy for ProxyResolver {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Proxy
    }

    fn is_configured(&self, _platform: PlatformId) -> bool {
        self.base.is_some()
    }

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError> {
        let base = self
            .base
            .as_deref()
            .ok_or_else(|| FetchError::Unparseable("no proxy base".to_string()))?;
        let endpoint = format!("{}/resolve", base.trim_end_matches('/'));
        resolve_remote(&self.http, &endpoint, url, Vec::new(), None, ctx).await
    }
}

/// Third-party aggregator, the last resort in every chain.
pub struct AggregatorResolver {
    http: Arc<HttpClient>,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl AggregatorResolver {
    pub fn new(http: Arc<HttpClient>, creds: &AggregatorCredentials) -> Self {
        Self {
            http,
            endpoint: creds.endpoint.clone(),
            api_key: creds.api_key.clone(),
        }
    }
}

#[async_trait]
impl FetchStrategy for AggregatorResolver {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Aggregator
    }

    fn is_configured(&self, _platform: PlatformId) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| FetchError::Unparseable("no aggregator endpoint".to_string()))?;
        let headers = match &self.api_key {
            Some(key) => vec![("X-Api-Key".to_string(), key.clone())],
            None => Vec::new(),
        };
        resolve_remote(&self.http, endpoint, url, headers, None, ctx).await
    }
}
