//! Download session tests against a mock package endpoint

use httpmock::prelude::*;
use plugget_errors::{AuthError, Error, NetworkError};
use plugget_net::{DownloadConfig, Downloader, NetClient, RetryConfig};
use plugget_types::CancelFlag;
use std::time::Duration;
use tempfile::TempDir;

fn test_data(size: usize) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn digest_of(data: &[u8]) -> String {
    blake3::Hasher::new()
        .update(data)
        .finalize()
        .to_hex()
        .to_string()
}

fn fast_downloader() -> Downloader {
    let config = DownloadConfig {
        retry: RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(10),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
            ..RetryConfig::default()
        },
        ..DownloadConfig::default()
    };
    Downloader::new(NetClient::with_defaults().unwrap(), config)
}

#[tokio::test]
async fn downloads_and_verifies_archive() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");
    let data = test_data(4096);
    let checksum = digest_of(&data);

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/packages/plugin.zip")
            .header("authorization", "Bearer valid-token");
        then.status(200)
            .header("content-length", data.len().to_string())
            .body(&data);
    });

    let downloader = fast_downloader();
    let cancel = CancelFlag::new();
    let outcome = downloader
        .download(
            &server.url("/packages/plugin.zip"),
            Some("valid-token"),
            &dest,
            Some(&checksum),
            &cancel,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.bytes, data.len() as u64);
    assert_eq!(outcome.checksum, checksum);
    assert!(!outcome.resumed);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
    mock.assert();
}

#[tokio::test]
async fn auth_rejection_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/packages/plugin.zip");
        then.status(401).body("token expired");
    });

    let downloader = fast_downloader();
    let cancel = CancelFlag::new();
    let err = downloader
        .download(
            &server.url("/packages/plugin.zip"),
            Some("stale-token"),
            &dest,
            None,
            &cancel,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Rejected { status: 401 })));
    // Exactly one request: the same token is never retried
    assert_eq!(mock.hits(), 1);
    assert!(!dest.exists());
}

#[tokio::test]
async fn transient_server_errors_are_retried_then_surfaced() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/packages/plugin.zip");
        then.status(503);
    });

    let downloader = fast_downloader();
    let cancel = CancelFlag::new();
    let err = downloader
        .download(
            &server.url("/packages/plugin.zip"),
            None,
            &dest,
            None,
            &cancel,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Network(NetworkError::HttpError { status: 503, .. })
    ));
    // Initial attempt plus the single configured retry
    assert_eq!(mock.hits(), 2);
    assert!(!dest.exists());
}

#[tokio::test]
async fn checksum_mismatch_fails_without_retry() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");
    let data = test_data(1024);

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/packages/plugin.zip");
        then.status(200).body(&data);
    });

    let downloader = fast_downloader();
    let cancel = CancelFlag::new();
    let err = downloader
        .download(
            &server.url("/packages/plugin.zip"),
            None,
            &dest,
            Some(&digest_of(b"different bytes")),
            &cancel,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Network(NetworkError::ChecksumMismatch { .. })
    ));
    assert_eq!(mock.hits(), 1);
    assert!(!dest.exists());
}

#[tokio::test]
async fn cancellation_removes_partial_file() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/packages/plugin.zip");
        then.status(200).body(test_data(1024));
    });

    let downloader = fast_downloader();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = downloader
        .download(
            &server.url("/packages/plugin.zip"),
            None,
            &dest,
            None,
            &cancel,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(!dest.exists());
}

#[tokio::test]
async fn oversized_archive_is_rejected() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");
    let data = test_data(64 * 1024);

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/packages/plugin.zip");
        then.status(200)
            .header("content-length", data.len().to_string())
            .body(&data);
    });

    let config = DownloadConfig {
        max_file_size: 1024,
        retry: RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
        ..DownloadConfig::default()
    };
    let downloader = Downloader::new(NetClient::with_defaults().unwrap(), config);
    let cancel = CancelFlag::new();

    let err = downloader
        .download(
            &server.url("/packages/plugin.zip"),
            None,
            &dest,
            None,
            &cancel,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Network(NetworkError::FileSizeExceeded { .. })
    ));
    assert!(!dest.exists());
}

#[tokio::test]
async fn progress_callback_reaches_completion() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugin.zip");
    let data = test_data(8192);

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/packages/plugin.zip");
        then.status(200)
            .header("content-length", data.len().to_string())
            .body(&data);
    });

    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let callback: plugget_net::ProgressFn = {
        let seen = seen.clone();
        Box::new(move |bytes, total| {
            seen.lock().unwrap().push((bytes, total));
        })
    };

    let downloader = fast_downloader();
    let cancel = CancelFlag::new();
    downloader
        .download(
            &server.url("/packages/plugin.zip"),
            None,
            &dest,
            None,
            &cancel,
            Some(&callback),
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let (bytes, total) = *seen.last().unwrap();
    assert_eq!(bytes, data.len() as u64);
    assert_eq!(total, Some(data.len() as u64));
}
