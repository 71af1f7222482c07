//! Shared test infrastructure
//!
//! - backend / storage clients pointed at a wiremock server
//! - temporary media files
//! - a transfer listener that records what it was told

#![allow(dead_code)]

use kanshi_uploadr::api::ApiClient;
use kanshi_uploadr::config::{BackendConfig, StorageConfig, UploadConfig};
use kanshi_uploadr::storage::StorageClient;
use kanshi_uploadr::upload::{SelectedFile, TransferListener};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "test-token";

pub fn api_client(server: &MockServer) -> Arc<ApiClient> {
    let config = BackendConfig {
        base_url: format!("{}/api", server.uri()),
        token: Some(TEST_TOKEN.to_string()),
        timeout_seconds: 5,
        ..Default::default()
    };
    Arc::new(ApiClient::new(&config).unwrap())
}

pub fn storage_client(server: &MockServer) -> StorageClient {
    StorageClient::new(&StorageConfig {
        upload_base_url: format!("{}/v1_1", server.uri()),
        ..Default::default()
    })
    .unwrap()
}

/// Fast timers so end-to-end flows finish in well under a second per poll
pub fn fast_upload_config() -> UploadConfig {
    UploadConfig {
        poll_interval_millis: 50,
        reconcile_tick_millis: 1,
        completion_delay_millis: 20,
        ..UploadConfig::default()
    }
}

/// A temp file of `size` bytes; keep the returned handle alive while it is used
pub fn media_file(size: usize, suffix: &str, mime: &str) -> (NamedTempFile, SelectedFile) {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    let chunk = vec![0x5au8; 64 * 1024];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(chunk.len());
        file.write_all(&chunk[..n]).unwrap();
        remaining -= n;
    }
    file.flush().unwrap();

    let name = file
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap()
        .to_string();
    let selected = SelectedFile::new(file.path(), name, size as u64, mime);
    (file, selected)
}

#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<(u64, u64)>>,
    pub stored: AtomicBool,
}

impl RecordingListener {
    pub fn last(&self) -> Option<(u64, u64)> {
        self.events.lock().last().copied()
    }

    pub fn was_stored(&self) -> bool {
        self.stored.load(Ordering::SeqCst)
    }
}

impl TransferListener for RecordingListener {
    fn bytes_sent(&self, sent: u64, total: u64) {
        self.events.lock().push((sent, total));
    }

    fn storage_complete(&self) {
        self.stored.store(true, Ordering::SeqCst);
    }
}
