//! Streaming artifact downloads.
//!
//! Single-attempt by design: a failed download is surfaced to the caller as
//! part of the package outcome, and re-running the install is the retry.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection, timeout or mid-stream transfer failure.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned HTTP {status}")]
    Http { status: u16 },
    /// The artifact could not be written to the temporary path.
    #[error("failed to write artifact to disk: {0}")]
    Disk(#[source] std::io::Error),
}

/// Byte-count progress callback. Implementations must not block the
/// transfer.
pub trait ProgressSink: Send + Sync {
    /// Called with the cumulative number of bytes transferred so far.
    fn on_bytes(&self, transferred: u64);
}

/// Sink that discards progress events.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_bytes(&self, _transferred: u64) {}
}

/// Sink that logs cumulative progress once per mebibyte.
pub struct LogProgress {
    name: String,
    last_mib: AtomicU64,
}

impl LogProgress {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_mib: AtomicU64::new(0),
        }
    }
}

impl ProgressSink for LogProgress {
    fn on_bytes(&self, transferred: u64) {
        let mib = transferred / (1024 * 1024);
        if mib > self.last_mib.swap(mib, Ordering::Relaxed) {
            info!("{}: downloaded {} MiB", self.name, mib);
        }
    }
}

/// Fetches a remote artifact to a local temporary path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stream `url` to `dest`, reporting cumulative bytes to `progress`.
    ///
    /// `dest` is only created once the server has answered with a success
    /// status, and is removed again if the transfer fails part-way, so a
    /// failed fetch leaves nothing behind. Returns the number of bytes
    /// written.
    async fn fetch<'p>(
        &self,
        url: &str,
        dest: &Path,
        progress: &'p (dyn ProgressSink + 'p),
    ) -> Result<u64, DownloadError>;
}

/// Downloader backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn stream_to_file(
        mut response: reqwest::Response,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<u64, DownloadError> {
        let mut file = std::fs::File::create(dest).map_err(DownloadError::Disk)?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(DownloadError::Network)? {
            file.write_all(&chunk).map_err(DownloadError::Disk)?;
            downloaded += chunk.len() as u64;
            progress.on_bytes(downloaded);
        }

        debug!(
            "Downloaded {:.2} MB to {:?}",
            downloaded as f64 / (1024.0 * 1024.0),
            dest
        );
        Ok(downloaded)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[tracing::instrument(skip(self, dest, progress))]
    async fn fetch<'p>(
        &self,
        url: &str,
        dest: &Path,
        progress: &'p (dyn ProgressSink + 'p),
    ) -> Result<u64, DownloadError> {
        info!("Downloading {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(DownloadError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
            });
        }

        let result = Self::stream_to_file(response, dest, progress).await;
        if result.is_err() {
            // Never leave a partial artifact at dest
            let _ = std::fs::remove_file(dest);
        }
        result
    }
}
