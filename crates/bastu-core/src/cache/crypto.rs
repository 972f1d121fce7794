//! At-rest encryption for cache files.
//!
//! Cached member rows include personal identity numbers, so every cache
//! file is sealed with ChaCha20-Poly1305. The file layout is a random
//! 12-byte nonce followed by the ciphertext and tag.

use std::path::Path;

use anyhow::{Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info};

use crate::auth::CredentialStore;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

/// Salt for passphrase-derived keys, stored next to the cache files.
pub const SALT_FILE: &str = "cache.salt";

/// When set, the cache key is derived from this passphrase instead of the keychain.
pub const PASSPHRASE_ENV: &str = "BASTU_CACHE_PASSPHRASE";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Failed to encrypt cache data")]
    Encrypt,

    #[error("Failed to decrypt cache data - wrong key or corrupted file")]
    Decrypt,

    #[error("Cache file is truncated ({0} bytes)")]
    Truncated(usize),
}

#[derive(Clone)]
pub struct CacheCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for CacheCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CacheCipher(..)")
    }
}

impl CacheCipher {
    pub fn from_key(key: &[u8]) -> Result<Self, CacheError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(key).map_err(|_| CacheError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Fresh random key from the OS RNG.
    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Argon2id over the passphrase and salt.
    pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], CacheError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| CacheError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CacheError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CacheError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CacheError> {
        if sealed.len() < NONCE_LEN {
            return Err(CacheError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CacheError::Decrypt)
    }

    /// Build the cipher for a cache directory.
    ///
    /// Uses the passphrase from [`PASSPHRASE_ENV`] when given, otherwise the
    /// key kept in the OS keychain, creating and storing one on first use.
    pub fn for_cache_dir(cache_dir: &Path, passphrase: Option<&str>) -> Result<Self> {
        let key = match passphrase {
            Some(passphrase) => {
                let salt = load_or_create_salt(cache_dir)?;
                debug!("Deriving cache key from passphrase");
                Self::derive_key(passphrase, &salt)?.to_vec()
            }
            None => match CredentialStore::get_cache_key()? {
                Some(key) => key,
                None => {
                    let key = Self::generate_key();
                    CredentialStore::store_cache_key(&key)?;
                    info!("Generated new cache encryption key");
                    key.to_vec()
                }
            },
        };
        Ok(Self::from_key(&key)?)
    }
}

fn load_or_create_salt(cache_dir: &Path) -> Result<Vec<u8>> {
    let path = cache_dir.join(SALT_FILE);
    if path.exists() {
        let salt = std::fs::read(&path).context("Failed to read cache salt")?;
        if salt.len() == SALT_LEN {
            return Ok(salt);
        }
        debug!(len = salt.len(), "Ignoring malformed cache salt");
    }

    std::fs::create_dir_all(cache_dir)?;
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    std::fs::write(&path, &salt).context("Failed to write cache salt")?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CacheCipher {
        CacheCipher::from_key(&CacheCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_prefixes_random_nonce() {
        let cipher = cipher();
        let a = cipher.encrypt(b"19800115-1234").unwrap();
        let b = cipher.encrypt(b"19800115-1234").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), NONCE_LEN + 13 + 16);
        assert_eq!(cipher.decrypt(&a).unwrap(), b"19800115-1234");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let sealed = cipher().encrypt(b"secret").unwrap();
        assert!(matches!(cipher().decrypt(&sealed), Err(CacheError::Decrypt)));
    }

    #[test]
    fn test_tampering_is_detected() {
        let cipher = cipher();
        let mut sealed = cipher.encrypt(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(cipher.decrypt(&sealed), Err(CacheError::Decrypt)));
        assert!(matches!(cipher.decrypt(&[1, 2, 3]), Err(CacheError::Truncated(3))));
    }

    #[test]
    fn test_key_length_is_checked() {
        assert!(matches!(
            CacheCipher::from_key(&[0u8; 16]),
            Err(CacheError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_passphrase_key_is_stable_per_salt() {
        let dir = tempfile::tempdir().unwrap();
        let first = CacheCipher::for_cache_dir(dir.path(), Some("bastu")).unwrap();
        let sealed = first.encrypt(b"rows").unwrap();

        let second = CacheCipher::for_cache_dir(dir.path(), Some("bastu")).unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), b"rows");

        let wrong = CacheCipher::for_cache_dir(dir.path(), Some("fel")).unwrap();
        assert!(wrong.decrypt(&sealed).is_err());
        assert_eq!(std::fs::read(dir.path().join(SALT_FILE)).unwrap().len(), SALT_LEN);
    }
}
