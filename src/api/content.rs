//! Content record and interaction endpoints

use super::{ApiClient, ApiError};
use crate::models::{
    Comment, ContentId, ContentKind, ContentRecord, ProcessingStatus, ReactionState,
    RecordEnvelope, SaveState, SaveUploadedRequest, UploadSignature, ViewCount,
};
use serde::Deserialize;

/// List endpoints answer either a bare array or `{ "videos": [..] }` / `{ "photos": [..] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordList {
    Bare(Vec<ContentRecord>),
    Wrapped {
        #[serde(alias = "videos", alias = "photos")]
        records: Vec<ContentRecord>,
    },
}

impl ApiClient {
    /// Signed credential for a direct object-storage upload
    #[tracing::instrument(name = "api.upload_signature", skip(self), fields(kind = %kind), err)]
    pub async fn upload_signature(&self, kind: ContentKind) -> Result<UploadSignature, ApiError> {
        self.get(&format!("/{}/upload-signature", kind.collection()), &[])
            .await
    }

    /// Create the content record for an object already in storage
    #[tracing::instrument(
        name = "api.save_uploaded",
        skip(self, body),
        fields(kind = %kind, storage.public_id = %body.public_id),
        err
    )]
    pub async fn save_uploaded(
        &self,
        kind: ContentKind,
        body: &SaveUploadedRequest,
    ) -> Result<ContentRecord, ApiError> {
        let envelope: RecordEnvelope = self
            .post_json(&format!("/{}/save-cloudinary", kind.collection()), body)
            .await?;
        Ok(envelope.record)
    }

    /// Relay upload: the backend receives the whole multipart body
    pub async fn relay_upload(
        &self,
        kind: ContentKind,
        form: reqwest::multipart::Form,
    ) -> Result<ContentRecord, ApiError> {
        let envelope: RecordEnvelope = self
            .post_multipart(&format!("/{}/upload", kind.collection()), form)
            .await?;
        Ok(envelope.record)
    }

    pub async fn get_record(
        &self,
        kind: ContentKind,
        id: &ContentId,
    ) -> Result<ContentRecord, ApiError> {
        let envelope: RecordEnvelope = self
            .get(&format!("/{}/{}", kind.collection(), id), &[])
            .await?;
        Ok(envelope.record)
    }

    /// The caller's own records, optionally filtered by processing status
    pub async fn list_records(
        &self,
        kind: ContentKind,
        status: Option<ProcessingStatus>,
    ) -> Result<Vec<ContentRecord>, ApiError> {
        let mut query = Vec::new();
        if let Some(status) = status {
            let value = serde_json::to_value(status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            query.push(("status", value));
        }
        let list: RecordList = self.get(&format!("/{}", kind.collection()), &query).await?;
        Ok(match list {
            RecordList::Bare(records) | RecordList::Wrapped { records } => records,
        })
    }

    pub async fn delete_record(&self, kind: ContentKind, id: &ContentId) -> Result<(), ApiError> {
        self.delete(&format!("/{}/{}", kind.collection(), id)).await
    }

    pub async fn toggle_like(
        &self,
        kind: ContentKind,
        id: &ContentId,
    ) -> Result<ReactionState, ApiError> {
        self.post_empty(&format!("/{}/{}/like", kind.collection(), id))
            .await
    }

    pub async fn toggle_dislike(
        &self,
        kind: ContentKind,
        id: &ContentId,
    ) -> Result<ReactionState, ApiError> {
        self.post_empty(&format!("/{}/{}/dislike", kind.collection(), id))
            .await
    }

    pub async fn toggle_save(&self, kind: ContentKind, id: &ContentId) -> Result<SaveState, ApiError> {
        self.post_empty(&format!("/{}/{}/save", kind.collection(), id))
            .await
    }

    pub async fn add_view(&self, kind: ContentKind, id: &ContentId) -> Result<ViewCount, ApiError> {
        self.post_empty(&format!("/{}/{}/view", kind.collection(), id))
            .await
    }

    /// Comments exist on videos only
    pub async fn list_comments(&self, video_id: &ContentId) -> Result<Vec<Comment>, ApiError> {
        self.get(&format!("/videos/{}/comments", video_id), &[])
            .await
    }

    pub async fn add_comment(
        &self,
        video_id: &ContentId,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::InvalidInput("comment cannot be empty".into()));
        }
        self.post_json(
            &format!("/videos/{}/comments", video_id),
            &serde_json::json!({ "content": content }),
        )
        .await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/comments/{}", comment_id)).await
    }
}
