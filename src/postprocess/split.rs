//! Lossless video splitting through ffmpeg stream copy.
//!
//! The input is cut into N time segments where N is chosen so each
//! segment lands under the target size with headroom. Stream copy
//! keeps splitting fast and bit-exact, at the cost of segment
//! boundaries landing on keyframes rather than exact sizes.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("ffmpeg not available at {0:?}")]
    FfmpegMissing(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("could not determine video duration")]
    UnknownDuration,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SplitPart {
    pub path: PathBuf,
    pub byte_size: u64,
}

pub struct VideoSplitter {
    ffmpeg: String,
    target_bytes: u64,
}

impl VideoSplitter {
    pub fn new(ffmpeg: impl Into<String>, target_bytes: u64) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            target_bytes,
        }
    }

    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Split `input` into parts each under the target size. Parts are
    /// written next to the input and returned in playback order; the
    /// input itself is left in place for the caller to release.
    pub async fn split(&self, input: &Path) -> Result<Vec<SplitPart>, SplitError> {
        if !self.is_available().await {
            return Err(SplitError::FfmpegMissing(self.ffmpeg.clone()));
        }

        let total = tokio::fs::metadata(input).await?.len();
        let parts = part_count(total, self.target_bytes);
        let duration = self.read_duration(input).await?;
        let segment_time = duration / parts as f64;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "part".to_string());
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        let pattern = dir.join(format!("{stem}_part%03d{ext}"));

        debug!(input = %input.display(), total, parts, segment_time, "splitting video");

        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-c", "copy", "-map", "0"])
            .args(["-f", "segment"])
            .args(["-segment_time", &format!("{segment_time:.2}")])
            .args(["-reset_timestamps", "1"])
            .arg(&pattern)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(input = %input.display(), "ffmpeg segmenting failed");
            return Err(SplitError::FfmpegFailed(
                stderr.lines().last().unwrap_or("unknown error").to_string(),
            ));
        }

        self.collect_parts(dir, &format!("{stem}_part"), &ext).await
    }

    /// ffmpeg prints the container duration on stderr when asked to inspect a file.
    async fn read_duration(&self, input: &Path) -> Result<f64, SplitError> {
        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .output()
            .await?;

        // inspect-only invocations exit non-zero, the stderr is still usable
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_duration(&stderr).ok_or(SplitError::UnknownDuration)
    }

    async fn collect_parts(
        &self,
        dir: &Path,
        prefix: &str,
        ext: &str,
    ) -> Result<Vec<SplitPart>, SplitError> {
        let mut parts = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) && name.ends_with(ext) {
                let meta = entry.metadata().await?;
                parts.push(SplitPart {
                    path: entry.path(),
                    byte_size: meta.len(),
                });
            }
        }
        if parts.is_empty() {
            return Err(SplitError::FfmpegFailed("no segments produced".to_string()));
        }
        // %03d numbering makes lexicographic order the playback order
        parts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(parts)
    }
}

/// Number of segments for a file of `total` bytes: enough that each
/// lands under `target` with headroom even when keyframe placement is
/// uneven.
fn part_count(total: u64, target: u64) -> u64 {
    (total / target.max(1)) + 1
}

fn parse_duration(stderr: &str) -> Option<f64> {
    let pattern = Regex::new(r"Duration: (\d+):(\d+):(\d+(?:\.\d+)?)").ok()?;
    let caps = pattern.captures(stderr)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
