#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Credential handling for plugget
//!
//! Holds the short-lived access token and the longer-lived refresh
//! token for the package endpoints. Token material lives in memory for
//! the lifetime of the editor session; persistence goes through the
//! host's [`SecretStore`] (platform secure storage), never plaintext.

mod credential;
mod provider;
mod store;

pub use credential::Credential;
pub use provider::{AuthProvider, SecretStore};
pub use store::CredentialStore;
