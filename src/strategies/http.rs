//! HTTP client shared by all fetch strategies

use reqwest::{Client, Proxy, Url};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HttpSettings;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("connection timeout")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;

const MAX_RETRIES: u32 = 3;

/// Thin wrapper over reqwest with the timeouts, user agent and retry
/// behaviour every strategy shares. One instance per proxy arrangement.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings, proxy_url: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .user_agent(&settings.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = proxy_url {
            let proxy =
                Proxy::all(url).map_err(|e| HttpError::InvalidUrl(format!("bad proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// GET a JSON document, with optional extra headers and bearer auth.
    pub async fn get_json(
        &self,
        url: Url,
        headers: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<serde_json::Value> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| HttpError::RequestFailed(format!("failed to read body: {e}")))
    }

    /// Download a resource to `dest`, retrying transient failures with
    /// exponential backoff. Returns the number of bytes written.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut attempts = 0;
        loop {
            attempts += 1;

            match self.download_once(url).await {
                Ok(bytes) => {
                    if attempts > 1 {
                        debug!(url, attempts, "download succeeded after retry");
                    }
                    tokio::fs::write(dest, &bytes).await?;
                    debug!(url, dest = %dest.display(), size = bytes.len(), "download completed");
                    return Ok(bytes.len() as u64);
                }
                Err(err @ HttpError::Status(_)) => {
                    // status errors are not retried, the server has answered
                    return Err(err);
                }
                Err(err) => {
                    if attempts >= MAX_RETRIES {
                        warn!(url, attempts, error = %err, "download failed after retries");
                        return Err(err);
                    }
                    warn!(url, attempts, error = %err, "download failed, retrying");
                    // Exponential backoff: 1s, 2s
                    let backoff = Duration::from_secs(2u64.pow(attempts - 1));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn download_once(&self, url: &str) -> Result<bytes::Bytes> {
        debug!(url, "starting download");

        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| HttpError::RequestFailed(format!("failed to read body: {e}")))
    }

    /// Follow redirects for a short link and return the final URL.
    pub async fn final_url(&self, url: &str) -> Result<String> {
        let response = self.client.head(url).send().await.map_err(classify)?;
        Ok(response.url().to_string())
    }
}

fn classify(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout
    } else {
        HttpError::RequestFailed(err.to_string())
    }
}
