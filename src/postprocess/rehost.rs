//! Image re-hosting on an external upload service.
//!
//! The service speaks a plain multipart protocol: `reqtype` selects
//! the operation, `fileToUpload` carries the bytes, an optional
//! `userhash` ties the upload to an account, and the response body is
//! the public URL.

use reqwest::multipart::{Form, Part};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::config::{HttpSettings, RehostConfig};

#[derive(Debug, Error)]
pub enum RehostError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("upload rejected with HTTP {0}")]
    Status(u16),

    #[error("unexpected response body: {0:?}")]
    BadResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Rehoster {
    client: reqwest::Client,
    endpoint: String,
    user_hash: Option<String>,
}

impl Rehoster {
    /// Returns `None` when re-hosting is disabled or has no endpoint.
    pub fn from_config(cfg: &RehostConfig, http: &HttpSettings) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        let endpoint = cfg.endpoint.clone()?;
        let client = reqwest::Client::builder()
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .user_agent(&http.user_agent)
            .build()
            .ok()?;
        Some(Self {
            client,
            endpoint,
            user_hash: cfg.user_hash.clone(),
        })
    }

    /// Upload a local file and return its public URL.
    pub async fn upload(&self, path: &Path) -> Result<String, RehostError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", Part::bytes(bytes).file_name(file_name));
        if let Some(hash) = &self.user_hash {
            form = form.text("userhash", hash.clone());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RehostError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RehostError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RehostError::Upload(e.to_string()))?;
        let url = body.trim();
        if !url.starts_with("http") {
            return Err(RehostError::BadResponse(url.chars().take(120).collect()));
        }

        debug!(file = %path.display(), url, "re-hosted");
        Ok(url.to_string())
    }
}
