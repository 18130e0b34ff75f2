//! Authentication provider backed by the provider's HTTP endpoints
//!
//! The interactive login flow lives in the editor; the CLI can only
//! mint a session from a refresh token supplied via the
//! `PLUGGET_REFRESH_TOKEN` environment variable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plugget_auth::{AuthProvider, Credential};
use plugget_errors::{AuthError, Error};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    expires_at: DateTime<Utc>,
    refresh_token: String,
}

pub struct HttpAuthProvider {
    client: reqwest::Client,
    refresh_url: String,
}

impl HttpAuthProvider {
    pub fn new(refresh_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            refresh_url: refresh_url.into(),
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Credential, Error> {
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::LoginFailed {
                reason: format!("refresh endpoint unreachable: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(AuthError::LoginFailed {
                reason: format!("refresh endpoint answered {}", response.status()),
            }
            .into());
        }

        let token: TokenResponse =
            response.json().await.map_err(|e| AuthError::LoginFailed {
                reason: format!("malformed token response: {e}"),
            })?;

        Ok(Credential::new(
            token.access_token,
            token.expires_at,
            token.refresh_token,
        ))
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn login(&self) -> Result<Credential, Error> {
        match std::env::var("PLUGGET_REFRESH_TOKEN") {
            Ok(refresh_token) if !refresh_token.is_empty() => self.exchange(&refresh_token).await,
            _ => Err(AuthError::LoginFailed {
                reason: "interactive sign-in happens in the editor; set PLUGGET_REFRESH_TOKEN \
                         to use the CLI"
                    .to_string(),
            }
            .into()),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential, Error> {
        self.exchange(refresh_token).await
    }
}
