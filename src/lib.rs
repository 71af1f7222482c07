//! Kanshi Uploadr Library
//!
//! Upload client for a moderated content-sharing platform. A file goes to
//! storage, the backend runs moderation on it, and the client follows
//! processing until it finishes.
//!
//! # Features
//!
//! - **Two transfer paths**: relay through the backend, or direct to object
//!   storage with a backend-signed credential
//! - **Upfront validation**: MIME allow-lists and per-path size ceilings
//! - **Processing tracking**: fixed-interval status polling that tolerates
//!   transient failures
//! - **Smooth progress**: a displayed percent that climbs one step per tick
//!   and never goes backwards
//! - **Cancellation**: one token stops transfer, polling and animation
//!
//! # Example
//!
//! ```no_run
//! use kanshi_uploadr::{ApiClient, Config, ContentKind, UploadController};
//! use kanshi_uploadr::upload::{RelayTransfer, SelectedFile, UploadMetadata};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let api = Arc::new(ApiClient::new(&config.backend)?);
//!     api.login("me@example.com", "secret").await?;
//!
//!     let controller = UploadController::new(
//!         ContentKind::Photo,
//!         &config.upload,
//!         Arc::new(RelayTransfer::new(api.clone())),
//!         api,
//!     );
//!     controller.select_file(SelectedFile::from_path(Path::new("cat.png"), None).await?)?;
//!     controller.set_metadata(UploadMetadata::new("Cat", ""));
//!     controller.submit().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use api::{ApiClient, ApiError};
pub use config::Config;
pub use models::{ContentId, ContentKind};
pub use upload::{UploadController, UploadError, UploadOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
