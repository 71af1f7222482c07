//! Backend API client
//!
//! One `ApiClient` is built at start-up and shared (`Arc<ApiClient>`) by every
//! component that talks to the backend. It attaches the bearer credential to
//! each call and hands 401 responses to a hook supplied by the caller instead
//! of acting on them itself.
//!
//! # Example
//!
//! ```no_run
//! use kanshi_uploadr::api::ApiClient;
//! use kanshi_uploadr::config::BackendConfig;
//! use kanshi_uploadr::models::{ContentId, ContentKind};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(&BackendConfig::default())?
//!     .with_unauthorized_hook(Arc::new(|| eprintln!("session expired")));
//! client.login("editor@example.com", "secret").await?;
//! let record = client.get_record(ContentKind::Video, &ContentId::new("abc123")).await?;
//! println!("{:?}", record.processing_status);
//! # Ok(())
//! # }
//! ```

use crate::config::BackendConfig;
use parking_lot::RwLock;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod auth;
mod content;

/// Invoked whenever the backend answers 401
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Backend client errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ApiError {
    /// Most specific human-readable detail: the backend's own message when it sent one
    pub fn detail(&self) -> String {
        match self {
            ApiError::Status { message, .. } | ApiError::Unauthorized(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// HTTP client for the content platform backend
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    on_unauthorized: Option<UnauthorizedHook>,
    timeout: Duration,
    upload_timeout: Duration,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.read().is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        // timeouts are per request: file bodies get the longer one
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(config.token.clone())),
            on_unauthorized: None,
            timeout: config.timeout(),
            upload_timeout: config.upload_timeout(),
        })
    }

    /// Install the 401 handler
    pub fn with_unauthorized_hook(mut self, hook: UnauthorizedHook) -> Self {
        self.on_unauthorized = Some(hook);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Raw client for calls outside the backend (no auth applied)
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send with auth and decode a JSON body
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send_checked(request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send with auth and map non-success statuses to errors
    async fn send_checked(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = self.apply_auth(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(message = %message, "Backend rejected credentials");
            if let Some(hook) = &self.on_unauthorized {
                hook();
            }
            return Err(ApiError::Unauthorized(message));
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut request = self.client.get(self.build_url(path)).timeout(self.timeout);
        if !query.is_empty() {
            request = request.query(query);
        }
        self.send(request).await
    }

    async fn post_json<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(
            self.client
                .post(self.build_url(path))
                .timeout(self.timeout)
                .json(body),
        )
        .await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(self.client.post(self.build_url(path)).timeout(self.timeout))
            .await
    }

    async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ApiError> {
        self.send(
            self.client
                .post(self.build_url(path))
                .timeout(self.upload_timeout)
                .multipart(form),
        )
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_checked(self.client.delete(self.build_url(path)).timeout(self.timeout))
            .await?;
        Ok(())
    }
}

/// Pull a message out of an error body: `{"message": ..}`, `{"error": ..}`,
/// `{"error": {"message": ..}}`, plain text, or the status reason.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.get("message"),
            value.get("error").and_then(|e| e.get("message")),
            value.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str().filter(|t| !t.trim().is_empty()) {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('{') && trimmed.len() <= 512 {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_message_field() {
        let msg = error_message(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Title is required"}"#,
        );
        assert_eq!(msg, "Title is required");
    }

    #[test]
    fn test_error_message_nested_storage_error() {
        let msg = error_message(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "Invalid Signature"}}"#,
        );
        assert_eq!(msg, "Invalid Signature");
    }

    #[test]
    fn test_error_message_plain_error_string() {
        let msg = error_message(StatusCode::FORBIDDEN, r#"{"error": "Editors only"}"#);
        assert_eq!(msg, "Editors only");
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        let msg = error_message(StatusCode::BAD_GATEWAY, "");
        assert_eq!(msg, "Bad Gateway");

        let msg = error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"ok": false}"#);
        assert_eq!(msg, "Internal Server Error");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = BackendConfig {
            base_url: "http://localhost:5000/api/".into(),
            ..Default::default()
        };
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.build_url("/videos"), "http://localhost:5000/api/videos");
    }

    #[test]
    fn test_token_can_be_replaced() {
        let client = ApiClient::new(&BackendConfig::default()).unwrap();
        assert!(client.token().is_none());
        client.set_token(Some("t1".into()));
        assert_eq!(client.token().as_deref(), Some("t1"));
        client.set_token(None);
        assert!(client.token().is_none());
    }
}
