//! Wire models shared by the backend client and the upload pipeline
//!
//! Field names follow the backend's JSON (camelCase, Mongo-style `_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Which collection an upload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Photo,
}

impl ContentKind {
    /// Backend collection path segment (`videos` / `photos`)
    pub fn collection(&self) -> &'static str {
        match self {
            ContentKind::Video => "videos",
            ContentKind::Photo => "photos",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Photo => "photo",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier the backend assigns to a content record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Users & auth
// ============================================================================

/// Account role. Unknown roles are treated as viewers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Editor,
    Admin,
    #[default]
    #[serde(other)]
    Viewer,
}

impl Role {
    /// Editors and admins may upload and delete content
    pub fn can_manage_content(&self) -> bool {
        matches!(self, Role::Editor | Role::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn id(&self) -> Option<&str> {
        self.object_id.as_deref().or(self.id.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ============================================================================
// Direct upload
// ============================================================================

/// Short-lived signed parameters for a direct object-storage upload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSignature {
    pub api_key: String,
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    pub signature: String,
    pub folder: String,
    pub cloud_name: String,
    pub resource_type: String,
}

/// Object-storage response to a successful upload
#[derive(Debug, Clone, Deserialize)]
pub struct StorageUploadResult {
    pub secure_url: String,
    pub public_id: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Body of the follow-up call that creates the content record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveUploadedRequest {
    pub title: String,
    pub description: String,
    pub cloudinary_url: String,
    pub public_id: String,
    pub filesize: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

// ============================================================================
// Content records
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

/// Moderation verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityStatus {
    Safe,
    Flagged,
    Pending,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub processing_progress: Option<f64>,
    #[serde(default)]
    pub processing_error: Option<String>,
    #[serde(default)]
    pub sensitivity_status: Option<SensitivityStatus>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    pub fn id(&self) -> Option<ContentId> {
        self.object_id
            .as_deref()
            .or(self.id.as_deref())
            .map(ContentId::new)
    }

    /// Reported progress as a percent in [0,100]
    pub fn progress_percent(&self) -> u8 {
        self.processing_progress
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0)
    }
}

/// `{ "video": {...} }` or `{ "photo": {...} }`
#[derive(Debug, Clone, Deserialize)]
pub struct RecordEnvelope {
    #[serde(alias = "video", alias = "photo")]
    pub record: ContentRecord,
}

// ============================================================================
// Interactions
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionState {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_disliked: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub is_saved: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewCount {
    pub views: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentAuthor {
    #[serde(default, rename = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub user: Option<CommentAuthor>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Accept either `"1700000000"` or `1700000000`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
