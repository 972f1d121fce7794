//! Authentication module for admin sessions and stored secrets.
//!
//! This module provides:
//! - `AdminSession`: an explicit, expiring session value handed to the API client
//! - `SessionStore`: persistence of the session between CLI runs
//! - `CredentialStore`: secure OS-level storage via keyring
//! - `Contact`: where one-time passwords are delivered

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{AdminSession, SessionStore};

use serde::{Deserialize, Serialize};

/// Where a one-time login code is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contact {
    Phone(String),
    Email(String),
}

impl Contact {
    /// The value used as the keychain account name.
    pub fn as_str(&self) -> &str {
        match self {
            Contact::Phone(p) => p,
            Contact::Email(e) => e,
        }
    }
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contact::Phone(p) => write!(f, "phone {}", p),
            Contact::Email(e) => write!(f, "email {}", e),
        }
    }
}
