//! Upload intake
//!
//! Gatekeeps the pipeline before any network traffic: MIME allow-list per
//! content kind, a byte ceiling that depends on the active transfer strategy,
//! and best-effort video duration extraction.

use super::UploadError;
use crate::config::{StrategyKind, UploadConfig};
use crate::models::ContentKind;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Accepted video container types
pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/x-msvideo",
    "video/mov",
    "video/quicktime",
    "video/wmv",
    "video/x-ms-wmv",
    "video/flv",
    "video/x-flv",
    "video/mkv",
    "video/x-matroska",
    "video/webm",
];

/// Accepted image types
pub const PHOTO_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Best guess of a MIME type from a file extension
pub fn mime_from_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime)
}

/// A local file chosen for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub byte_size: u64,
    pub mime_type: String,
}

impl SelectedFile {
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        byte_size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            byte_size,
            mime_type: mime_type.into(),
        }
    }

    /// Stat a file on disk. The MIME type is `mime_override` when given,
    /// else guessed from the extension (`application/octet-stream` if unknown).
    pub async fn from_path(path: &Path, mime_override: Option<&str>) -> Result<Self, UploadError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();

        let mime_type = match mime_override {
            Some(mime) => mime.to_string(),
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(mime_from_extension)
                .unwrap_or("application/octet-stream")
                .to_string(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            name,
            byte_size: metadata.len(),
            mime_type,
        })
    }
}

/// Validates files against the allow-list and the active strategy's ceiling
#[derive(Debug, Clone)]
pub struct UploadIntake {
    config: UploadConfig,
    strategy: StrategyKind,
}

impl UploadIntake {
    pub fn new(config: &UploadConfig, strategy: StrategyKind) -> Self {
        Self {
            config: config.clone(),
            strategy,
        }
    }

    pub fn allowed_mime_types(kind: ContentKind) -> &'static [&'static str] {
        match kind {
            ContentKind::Video => VIDEO_MIME_TYPES,
            ContentKind::Photo => PHOTO_MIME_TYPES,
        }
    }

    pub fn ceiling(&self, kind: ContentKind) -> u64 {
        self.config.ceiling(self.strategy, kind)
    }

    pub fn validate(&self, kind: ContentKind, file: &SelectedFile) -> Result<(), UploadError> {
        let allowed = Self::allowed_mime_types(kind);
        let mime = file.mime_type.trim().to_ascii_lowercase();
        if !allowed.contains(&mime.as_str()) {
            return Err(UploadError::InvalidType {
                kind,
                mime_type: file.mime_type.clone(),
                allowed: allowed.join(", "),
            });
        }

        if file.byte_size == 0 {
            return Err(UploadError::EmptyFile);
        }

        let max = self.ceiling(kind);
        if file.byte_size > max {
            return Err(UploadError::FileTooLarge {
                size: file.byte_size,
                max,
                kind,
                strategy: self.strategy.as_str(),
            });
        }

        Ok(())
    }
}

/// Reads a media duration in seconds. `None` means unknown; callers bound the wait.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Option<f64>;
}

/// Duration from `ffprobe -show_entries format=duration`
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    ffprobe_path: String,
}

impl FfprobeDurationProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    #[tracing::instrument(
        name = "intake.probe_duration",
        skip(self),
        fields(process.executable.path = %self.ffprobe_path)
    )]
    async fn probe(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::debug!(
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "ffprobe exited with failure"
                );
                return None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "ffprobe could not be started");
                return None;
            }
        };

        parse_ffprobe_duration(&output.stdout)
    }
}

fn parse_ffprobe_duration(stdout: &[u8]) -> Option<f64> {
    let value: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    let duration = &value["format"]["duration"];
    let seconds = duration
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| duration.as_f64())?;
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}
