use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "bastu";

/// Keychain account holding the cache encryption key.
const CACHE_KEY_ACCOUNT: &str = "cache-key";

pub struct CredentialStore;

impl CredentialStore {
    /// Store the refresh token for an admin login in the OS keychain
    pub fn store_refresh_token(account: &str, token: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store refresh token in keychain")?;
        Ok(())
    }

    /// Retrieve the refresh token for an admin login
    pub fn get_refresh_token(account: &str) -> Result<String> {
        let entry =
            Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve refresh token from keychain")
    }

    /// Delete stored credentials for an admin login
    pub fn delete(account: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    /// Fetch the cache key, if one has been stored.
    pub fn get_cache_key() -> Result<Option<Vec<u8>>> {
        let entry = Entry::new(SERVICE_NAME, CACHE_KEY_ACCOUNT)
            .context("Failed to create keyring entry")?;
        match entry.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read cache key from keychain"),
        }
    }

    pub fn store_cache_key(key: &[u8]) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, CACHE_KEY_ACCOUNT)
            .context("Failed to create keyring entry")?;
        entry
            .set_secret(key)
            .context("Failed to store cache key in keychain")?;
        Ok(())
    }
}
