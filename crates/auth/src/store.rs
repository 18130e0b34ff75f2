//! Credential store state machine
//!
//! Two states: `Unauthenticated` and `Authenticated`. An invalidated
//! session drops back to `Unauthenticated` but may retain the refresh
//! token, so the next `token()` call performs one refresh round-trip
//! instead of forcing an interactive login. A failed refresh discards
//! everything.

use crate::{AuthProvider, Credential, SecretStore};
use chrono::{Duration, Utc};
use plugget_errors::{AuthError, Error};
use plugget_events::{AppEvent, AuthEvent, EventEmitter, EventSender};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Refresh this long before the recorded expiry, so a token never
/// expires mid-request.
const REFRESH_SKEW_SECONDS: i64 = 30;

enum State {
    Unauthenticated { refresh_token: Option<String> },
    Authenticated(Credential),
}

/// Owns all token material and the refresh lifecycle
///
/// Safe for concurrent use: the internal lock is held across a refresh
/// round-trip, so many installs triggering a refresh at once produce a
/// single provider call that benefits them all.
pub struct CredentialStore {
    provider: Arc<dyn AuthProvider>,
    state: Mutex<State>,
    tx: Option<EventSender>,
}

impl EventEmitter for CredentialStore {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl CredentialStore {
    #[must_use]
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(State::Unauthenticated {
                refresh_token: None,
            }),
            tx: None,
        }
    }

    #[must_use]
    pub fn with_events(provider: Arc<dyn AuthProvider>, tx: EventSender) -> Self {
        Self {
            provider,
            state: Mutex::new(State::Unauthenticated {
                refresh_token: None,
            }),
            tx: Some(tx),
        }
    }

    /// Run the provider's interactive login flow and adopt the result
    ///
    /// # Errors
    ///
    /// Propagates the provider's login failure.
    pub async fn login(&self) -> Result<(), Error> {
        let credential = self.provider.login().await?;
        let mut state = self.state.lock().await;
        *state = State::Authenticated(credential);
        Ok(())
    }

    /// Adopt a credential restored from secure storage
    pub async fn adopt(&self, credential: Credential) {
        let mut state = self.state.lock().await;
        *state = State::Authenticated(credential);
    }

    /// Get a valid access token, refreshing if the held one is expired
    ///
    /// # Errors
    ///
    /// `AuthError::Required` when no credential and no refresh token is
    /// held; `AuthError::Expired` when the refresh itself is rejected
    /// (the refresh token has been revoked).
    pub async fn token(&self) -> Result<String, Error> {
        let mut state = self.state.lock().await;

        let refresh_token = match &*state {
            State::Authenticated(credential) => {
                let valid_until =
                    credential.expires_at - Duration::seconds(REFRESH_SKEW_SECONDS);
                if Utc::now() < valid_until {
                    return Ok(credential.access_token.clone());
                }
                credential.refresh_token.clone()
            }
            State::Unauthenticated {
                refresh_token: Some(token),
            } => token.clone(),
            State::Unauthenticated {
                refresh_token: None,
            } => {
                self.emit(AppEvent::Auth(AuthEvent::LoginRequired));
                return Err(AuthError::Required.into());
            }
        };

        // Lock stays held: one refresh round-trip serves every caller.
        self.emit(AppEvent::Auth(AuthEvent::Refreshing));
        match self.provider.refresh(&refresh_token).await {
            Ok(credential) => {
                let access_token = credential.access_token.clone();
                self.emit(AppEvent::Auth(AuthEvent::Refreshed {
                    expires_at: credential.expires_at,
                }));
                *state = State::Authenticated(credential);
                Ok(access_token)
            }
            Err(e) => {
                *state = State::Unauthenticated {
                    refresh_token: None,
                };
                Err(AuthError::Expired {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    /// Discard the access token after a server-side rejection
    ///
    /// The refresh token is kept, so the retry path can obtain a fresh
    /// access token without user interaction. Avoids futile retries
    /// with a token the server has already refused.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if let State::Authenticated(credential) = &*state {
            self.emit(AppEvent::Auth(AuthEvent::Invalidated));
            *state = State::Unauthenticated {
                refresh_token: Some(credential.refresh_token.clone()),
            };
        }
    }

    /// Forget everything, including the refresh token
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        *state = State::Unauthenticated {
            refresh_token: None,
        };
    }

    /// Whether a credential is currently held
    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.state.lock().await, State::Authenticated(_))
    }

    /// Persist the held credential through the host's secure storage
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn persist(&self, secrets: &dyn SecretStore) -> Result<(), Error> {
        let state = self.state.lock().await;
        match &*state {
            State::Authenticated(credential) => secrets.store(credential).await,
            State::Unauthenticated { .. } => secrets.clear().await,
        }
    }

    /// Restore a persisted credential, if any
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn restore(&self, secrets: &dyn SecretStore) -> Result<bool, Error> {
        match secrets.load().await? {
            Some(credential) => {
                self.adopt(credential).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
