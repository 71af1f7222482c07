//! Shared transfer plumbing
//!
//! File bodies are streamed from disk through [`ProgressStream`], which
//! reports every chunk handed to the transport to a [`TransferListener`].

use super::intake::SelectedFile;
use super::{TransferListener, UploadError};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

/// Integer percent of `sent` over `total`, rounded, in [0,100]. An empty body is complete.
pub fn transfer_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let sent = sent.min(total) as u128;
    ((sent * 100 + total as u128 / 2) / total as u128) as u8
}

pin_project! {
    /// Byte-counting stream adapter
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        sent: u64,
        total: u64,
        listener: Arc<dyn TransferListener>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: u64, listener: Arc<dyn TransferListener>) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            listener,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let item = this.inner.poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &item {
            *this.sent += chunk.len() as u64;
            this.listener.bytes_sent(*this.sent, *this.total);
        }
        item
    }
}

/// Multipart part streaming `file` from disk with progress reporting
pub async fn file_part(
    file: &SelectedFile,
    listener: Arc<dyn TransferListener>,
) -> Result<reqwest::multipart::Part, UploadError> {
    let handle = tokio::fs::File::open(&file.path).await?;
    let stream = ProgressStream::new(ReaderStream::new(handle), file.byte_size, listener);
    let body = reqwest::Body::wrap_stream(stream);

    reqwest::multipart::Part::stream_with_length(body, file.byte_size)
        .file_name(file.name.clone())
        .mime_str(&file.mime_type)
        .map_err(|e| UploadError::TransferFailed(format!("Invalid content type: {}", e)))
}
