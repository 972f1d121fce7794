use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Contact;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Refresh this long before the access token expires.
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// A logged-in administrator.
///
/// The session is passed explicitly to everything that talks to the backend;
/// nothing looks it up from ambient storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub contact: Contact,
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

/// Saves the current session next to the cache so the CLI stays logged in.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Load the saved session, including an expired one so it can be refreshed.
    pub fn load(&self) -> Result<Option<AdminSession>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session: AdminSession =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    /// Load the saved session only if it is still valid at `now`.
    pub fn load_valid(&self, now: DateTime<Utc>) -> Result<Option<AdminSession>> {
        Ok(self.load()?.filter(|s| {
            let valid = !s.is_expired(now);
            if !valid {
                debug!(expired_at = %s.expires_at, "Saved session has expired");
            }
            valid
        }))
    }

    pub fn save(&self, session: &AdminSession) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(self.session_path(), contents)?;
        Ok(())
    }

    /// Clear session data
    pub fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(expires_at: DateTime<Utc>) -> AdminSession {
        AdminSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            user_id: "user-1".to_string(),
            contact: Contact::Email("styrelsen@example.se".to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_expiry_and_refresh_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let s = session(now + Duration::minutes(30));
        assert!(!s.is_expired(now));
        assert!(!s.needs_refresh(now));
        assert_eq!(s.minutes_until_expiry(now), 30);

        let later = now + Duration::minutes(26);
        assert!(s.needs_refresh(later));
        assert!(!s.is_expired(later));

        let after = now + Duration::minutes(31);
        assert!(s.is_expired(after));
        assert_eq!(s.minutes_until_expiry(after), 0);
    }

    #[test]
    fn test_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested"));
        assert!(store.load().unwrap().is_none());

        let now = Utc::now();
        let s = session(now + Duration::hours(1));
        store.save(&s).unwrap();
        assert_eq!(store.load_valid(now).unwrap(), Some(s));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_load_valid_skips_expired_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let now = Utc::now();
        store.save(&session(now - Duration::minutes(1))).unwrap();

        assert!(store.load_valid(now).unwrap().is_none());
        assert!(store.load().unwrap().is_some());
    }
}
