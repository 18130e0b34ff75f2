//! Seams to the host's identity provider and secure storage

use crate::Credential;
use async_trait::async_trait;
use plugget_errors::Error;

/// The external authentication provider
///
/// `login` runs the provider's interactive flow and is only ever
/// triggered by explicit user action; `refresh` is a silent round-trip
/// exchanging the refresh token for a renewed access token.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self) -> Result<Credential, Error>;

    async fn refresh(&self, refresh_token: &str) -> Result<Credential, Error>;
}

/// Platform secure storage for credentials at rest
///
/// Implementations are expected to encrypt; plugget never writes token
/// material to disk itself.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, Error>;

    async fn store(&self, credential: &Credential) -> Result<(), Error>;

    async fn clear(&self) -> Result<(), Error>;
}
