#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for plugget
//!
//! This crate handles all HTTP operations: manifest fetching, bearer-
//! authenticated package downloads with retry and optional range
//! resume, and the checksum-keyed download cache.

mod cache;
mod client;
mod digest;
mod download;

pub use cache::DownloadCache;
pub use client::{NetClient, NetConfig};
pub use digest::hash_file;
pub use download::{DownloadConfig, DownloadOutcome, Downloader, ProgressFn, RetryConfig};

use plugget_errors::{Error, NetworkError};
use url::Url;

/// Fetch text content from a URL
///
/// # Errors
///
/// Returns an error if the HTTP request fails, the server returns an
/// error status, or the response body cannot be decoded as text.
pub async fn fetch_text(client: &NetClient, url: &str) -> Result<String, Error> {
    let response = client.get(url, None).await?;

    if !response.status().is_success() {
        return Err(NetworkError::HttpError {
            status: response.status().as_u16(),
            message: response.status().to_string(),
        }
        .into());
    }

    response
        .text()
        .await
        .map_err(|e| NetworkError::DownloadFailed(e.to_string()).into())
}

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed, or uses a scheme
/// other than http(s).
pub fn parse_url(url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(NetworkError::UnsupportedProtocol {
            protocol: scheme.to_string(),
        }
        .into()),
    }
}
