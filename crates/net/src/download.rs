//! Streaming archive download
//!
//! One download session per install attempt: bearer-authenticated GET,
//! response bytes streamed straight to the destination temp file, a
//! BLAKE3 digest computed on the way through. Transient failures are
//! retried with exponential backoff; a 401/403 is surfaced immediately
//! as an auth rejection so the install manager can refresh the
//! credential and retry once. The temp file is removed on every
//! non-success outcome, including cancellation.

use crate::client::NetClient;
use futures::StreamExt;
use plugget_errors::{AuthError, Error, NetworkError};
use plugget_events::{AppEvent, DownloadEvent, EventEmitter, EventSender};
use plugget_types::CancelFlag;
use reqwest::StatusCode;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs::{self as tokio_fs, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// Progress callback: (bytes downloaded, total bytes if known)
pub type ProgressFn = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Retry configuration for downloads
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Configuration for archive downloads
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum archive size allowed (default: 2GiB)
    pub max_file_size: u64,
    /// Minimum progress event spacing (default: 50ms)
    pub progress_interval: Duration,
    /// Partial files smaller than this are restarted, not resumed
    pub min_resume_offset: u64,
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 2 * 1024 * 1024 * 1024,
            progress_interval: Duration::from_millis(50),
            min_resume_offset: 1024 * 1024,
            retry: RetryConfig::default(),
        }
    }
}

/// Result of a completed download
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub bytes: u64,
    /// Hex-encoded BLAKE3 digest of the downloaded bytes
    pub checksum: String,
    /// Whether any part of the transfer was resumed from a partial file
    pub resumed: bool,
}

/// A streaming archive downloader
#[derive(Clone)]
pub struct Downloader {
    config: DownloadConfig,
    client: NetClient,
    tx: Option<EventSender>,
}

impl EventEmitter for Downloader {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl Downloader {
    #[must_use]
    pub fn new(client: NetClient, config: DownloadConfig) -> Self {
        Self {
            config,
            client,
            tx: None,
        }
    }

    #[must_use]
    pub fn with_events(client: NetClient, config: DownloadConfig, tx: EventSender) -> Self {
        Self {
            config,
            client,
            tx: Some(tx),
        }
    }

    /// Download `url` to `dest`, streaming and digesting on the way.
    ///
    /// The destination is removed on any non-success outcome. When
    /// `expected_checksum` is given, a digest mismatch fails the
    /// download without retrying (a mismatch means a bad upload or
    /// tampering, which a retry will not fix).
    ///
    /// # Errors
    ///
    /// `AuthError::Rejected` on 401/403 (never retried here),
    /// `NetworkError` variants after bounded retries for transient
    /// failures, `NetworkError::ChecksumMismatch` on digest mismatch,
    /// `Error::Cancelled` if the cancel flag is raised.
    pub async fn download(
        &self,
        url: &str,
        bearer: Option<&str>,
        dest: &Path,
        expected_checksum: Option<&str>,
        cancel: &CancelFlag,
        on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadOutcome, Error> {
        crate::parse_url(url)?;

        let result = self
            .download_with_retries(url, bearer, dest, expected_checksum, cancel, on_progress)
            .await;

        if let Err(e) = &result {
            let _ = tokio_fs::remove_file(dest).await;
            self.emit(AppEvent::Download(DownloadEvent::Failed {
                url: url.to_string(),
                error: e.to_string(),
            }));
        }

        result
    }

    async fn download_with_retries(
        &self,
        url: &str,
        bearer: Option<&str>,
        dest: &Path,
        expected_checksum: Option<&str>,
        cancel: &CancelFlag,
        on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadOutcome, Error> {
        let mut supports_resume = false;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self
                .try_download(url, bearer, dest, &mut supports_resume, cancel, on_progress)
                .await
            {
                Ok(outcome) => {
                    if let Some(expected) = expected_checksum {
                        if !outcome.checksum.eq_ignore_ascii_case(expected) {
                            return Err(NetworkError::ChecksumMismatch {
                                expected: expected.to_ascii_lowercase(),
                                actual: outcome.checksum,
                            }
                            .into());
                        }
                    }

                    self.emit(AppEvent::Download(DownloadEvent::Completed {
                        url: url.to_string(),
                        final_size: outcome.bytes,
                    }));
                    return Ok(outcome);
                }
                Err(e) => {
                    if !is_transient(&e) {
                        return Err(e);
                    }

                    attempt += 1;
                    if attempt > self.config.retry.max_retries {
                        return Err(e);
                    }

                    let delay = backoff_delay(&self.config.retry, attempt);
                    self.emit(AppEvent::Download(DownloadEvent::Retrying {
                        url: url.to_string(),
                        attempt,
                        max_attempts: self.config.retry.max_retries,
                        backoff_delay: delay,
                    }));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One transfer attempt, possibly resuming a partial file
    async fn try_download(
        &self,
        url: &str,
        bearer: Option<&str>,
        dest: &Path,
        supports_resume: &mut bool,
        cancel: &CancelFlag,
        on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadOutcome, Error> {
        // Resume is only attempted once the server has advertised range
        // support on an earlier response; it is never assumed.
        let resume_offset = if *supports_resume {
            self.resume_offset(dest).await?
        } else {
            0
        };

        let mut headers = Vec::new();
        if resume_offset > 0 {
            headers.push(("range", format!("bytes={resume_offset}-")));
            self.emit(AppEvent::Download(DownloadEvent::Resuming {
                url: url.to_string(),
                offset: resume_offset,
            }));
        }

        let response = self.client.get_once(url, bearer, &headers).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            }
            .into());
        }

        if let Some(value) = response.headers().get(reqwest::header::ACCEPT_RANGES) {
            if value.to_str().is_ok_and(|v| v.eq_ignore_ascii_case("bytes")) {
                *supports_resume = true;
            }
        }

        let write_offset = if resume_offset > 0 {
            if status == StatusCode::PARTIAL_CONTENT {
                resume_offset
            } else if status.is_success() {
                // Server ignored the range header; start over
                0
            } else {
                *supports_resume = false;
                return Err(NetworkError::RangeNotSatisfied.into());
            }
        } else if status.is_success() {
            0
        } else {
            return Err(NetworkError::HttpError {
                status: status.as_u16(),
                message: status.to_string(),
            }
            .into());
        };

        let total_size = response
            .content_length()
            .map(|remaining| write_offset + remaining);
        if let Some(total) = total_size {
            if total > self.config.max_file_size {
                return Err(NetworkError::FileSizeExceeded {
                    size: total,
                    limit: self.config.max_file_size,
                }
                .into());
            }
        }

        self.emit(AppEvent::Download(DownloadEvent::Started {
            url: url.to_string(),
            total_size,
            supports_resume: *supports_resume,
        }));

        self.stream_to_file(response, dest, write_offset, url, total_size, cancel, on_progress)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        dest: &Path,
        write_offset: u64,
        url: &str,
        total_size: Option<u64>,
        cancel: &CancelFlag,
        on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadOutcome, Error> {
        let mut file = if write_offset > 0 {
            let mut file = OpenOptions::new()
                .write(true)
                .truncate(false)
                .open(dest)
                .await
                .map_err(|e| Error::io_with_path(&e, dest))?;
            file.seek(SeekFrom::Start(write_offset)).await?;
            file
        } else {
            File::create(dest)
                .await
                .map_err(|e| Error::io_with_path(&e, dest))?
        };

        let mut hasher = if write_offset > 0 {
            rehash_prefix(dest, write_offset).await?
        } else {
            blake3::Hasher::new()
        };

        let mut downloaded = write_offset;
        let mut last_progress = Instant::now();
        let mut first_chunk = true;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let chunk = chunk.map_err(|e| NetworkError::DownloadFailed(e.to_string()))?;
            downloaded += chunk.len() as u64;

            if downloaded > self.config.max_file_size {
                return Err(NetworkError::FileSizeExceeded {
                    size: downloaded,
                    limit: self.config.max_file_size,
                }
                .into());
            }

            hasher.update(&chunk);
            file.write_all(&chunk).await?;

            if first_chunk || last_progress.elapsed() >= self.config.progress_interval {
                self.emit(AppEvent::Download(DownloadEvent::Progress {
                    url: url.to_string(),
                    bytes_downloaded: downloaded,
                    total_bytes: total_size,
                }));
                if let Some(callback) = on_progress {
                    callback(downloaded, total_size);
                }
                last_progress = Instant::now();
                first_chunk = false;
            }
        }

        file.flush().await?;
        drop(file);

        // Final progress update so 100% is always reported
        self.emit(AppEvent::Download(DownloadEvent::Progress {
            url: url.to_string(),
            bytes_downloaded: downloaded,
            total_bytes: total_size,
        }));
        if let Some(callback) = on_progress {
            callback(downloaded, total_size);
        }

        Ok(DownloadOutcome {
            bytes: downloaded,
            checksum: hasher.finalize().to_hex().to_string(),
            resumed: write_offset > 0,
        })
    }

    /// Offset to resume from, or 0 when the partial file is too small
    /// to be worth resuming (it is removed in that case)
    async fn resume_offset(&self, dest: &Path) -> Result<u64, Error> {
        match tokio_fs::metadata(dest).await {
            Ok(metadata) => {
                let size = metadata.len();
                if size >= self.config.min_resume_offset {
                    Ok(size)
                } else {
                    let _ = tokio_fs::remove_file(dest).await;
                    Ok(0)
                }
            }
            Err(_) => Ok(0),
        }
    }
}

/// Rehash an existing partial file so the final digest covers the
/// resumed bytes too
async fn rehash_prefix(path: &Path, bytes: u64) -> Result<blake3::Hasher, Error> {
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut remaining = bytes;

    while remaining > 0 {
        let to_read = usize::try_from(remaining.min(buffer.len() as u64)).unwrap_or(buffer.len());
        let n = file.read(&mut buffer[..to_read]).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        remaining -= n as u64;
    }

    Ok(hasher)
}

/// Whether a failed attempt is worth retrying with the same request
fn is_transient(error: &Error) -> bool {
    match error {
        Error::Network(NetworkError::HttpError { status, .. }) => *status >= 500,
        Error::Network(
            NetworkError::Timeout { .. }
            | NetworkError::DownloadFailed(_)
            | NetworkError::ConnectionRefused(_)
            | NetworkError::RangeNotSatisfied,
        ) => true,
        _ => false,
    }
}

/// Exponential backoff with jitter
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let base = retry.initial_delay.as_millis() as f64;
    #[allow(clippy::cast_precision_loss)]
    let max = retry.max_delay.as_millis() as f64;

    #[allow(clippy::cast_possible_wrap)]
    let delay = (base * retry.backoff_multiplier.powi(attempt as i32 - 1)).min(max);

    let jitter = delay * retry.jitter_factor * (rand::random::<f64>() - 0.5);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let final_delay = (delay + jitter).max(0.0).round() as u64;

    Duration::from_millis(final_delay)
}
