use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::crypto::CacheCipher;
use crate::models::{AccessEvent, Member, MemberRelation, SmsGroup, VisitStats};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const CACHE_EXTENSION: &str = "json.enc";

/// Every dataset the manager knows how to store.
pub const DATASETS: [&str; 5] = ["members", "visit_stats", "relations", "access_events", "sms_groups"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

pub struct CacheManager {
    cache_dir: PathBuf,
    cipher: CacheCipher,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf, cipher: CacheCipher) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir, cipher })
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", name, CACHE_EXTENSION))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let sealed = std::fs::read(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;
        let contents = self
            .cipher
            .decrypt(&sealed)
            .with_context(|| format!("Failed to decrypt cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_vec(&cached)?;
        let sealed = self.cipher.encrypt(&contents)?;
        std::fs::write(self.cache_path(name), sealed)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        debug!(cache = name, bytes = contents.len(), "Cache saved");
        Ok(())
    }

    // ===== Members =====

    pub fn load_members(&self) -> Result<Option<CachedData<Vec<Member>>>> {
        self.load("members")
    }

    pub fn save_members(&self, members: &[Member]) -> Result<()> {
        self.save("members", &members)
    }

    // ===== Visit stats =====

    pub fn load_visit_stats(&self) -> Result<Option<CachedData<Vec<VisitStats>>>> {
        self.load("visit_stats")
    }

    pub fn save_visit_stats(&self, stats: &[VisitStats]) -> Result<()> {
        self.save("visit_stats", &stats)
    }

    // ===== Relations =====

    pub fn load_relations(&self) -> Result<Option<CachedData<Vec<MemberRelation>>>> {
        self.load("relations")
    }

    pub fn save_relations(&self, relations: &[MemberRelation]) -> Result<()> {
        self.save("relations", &relations)
    }

    // ===== Access events =====

    pub fn load_access_events(&self) -> Result<Option<CachedData<Vec<AccessEvent>>>> {
        self.load("access_events")
    }

    pub fn save_access_events(&self, events: &[AccessEvent]) -> Result<()> {
        self.save("access_events", &events)
    }

    // ===== SMS groups =====

    pub fn load_sms_groups(&self) -> Result<Option<CachedData<Vec<SmsGroup>>>> {
        self.load("sms_groups")
    }

    pub fn save_sms_groups(&self, groups: &[SmsGroup]) -> Result<()> {
        self.save("sms_groups", &groups)
    }

    /// Remove every cached dataset. The session and salt files are kept.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for name in DATASETS {
            let path = self.cache_path(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove cache file: {}", name))?;
                removed += 1;
            }
        }
        debug!(removed = removed, "Cache cleared");
        Ok(removed)
    }

    // ===== Cache Age Information =====

    /// Helper to load cache and log errors without failing
    fn load_age<T>(&self, name: &str, loader: impl FnOnce() -> Result<Option<CachedData<T>>>) -> Option<String> {
        match loader() {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = name, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }

    pub fn get_cache_ages(&self) -> CacheAges {
        CacheAges {
            members: self.load_age("members", || self.load_members()),
            visit_stats: self.load_age("visit_stats", || self.load_visit_stats()),
            relations: self.load_age("relations", || self.load_relations()),
            access_events: self.load_age("access_events", || self.load_access_events()),
            sms_groups: self.load_age("sms_groups", || self.load_sms_groups()),
        }
    }

    fn is_cache_stale<T>(&self, name: &str, loader: impl FnOnce() -> Result<Option<CachedData<T>>>) -> bool {
        match loader() {
            Ok(Some(cached)) => cached.is_stale(),
            Ok(None) => true,
            Err(e) => {
                debug!(cache = name, error = %e, "Failed to load cache for staleness check");
                true
            }
        }
    }

    /// Check if any of the directory datasets is stale
    pub fn any_stale(&self) -> bool {
        let stale_checks = [
            self.is_cache_stale("members", || self.load_members()),
            self.is_cache_stale("visit_stats", || self.load_visit_stats()),
            self.is_cache_stale("relations", || self.load_relations()),
        ];
        stale_checks.iter().any(|&stale| stale)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheAges {
    pub members: Option<String>,
    pub visit_stats: Option<String>,
    pub relations: Option<String>,
    pub access_events: Option<String>,
    pub sms_groups: Option<String>,
}

impl CacheAges {
    /// Dataset name and age, "never" when absent, in a fixed order.
    pub fn entries(&self) -> [(&'static str, String); 5] {
        let show = |age: &Option<String>| age.clone().unwrap_or_else(|| "never".to_string());
        [
            (DATASETS[0], show(&self.members)),
            (DATASETS[1], show(&self.visit_stats)),
            (DATASETS[2], show(&self.relations)),
            (DATASETS[3], show(&self.access_events)),
            (DATASETS[4], show(&self.sms_groups)),
        ]
    }

    pub fn directory_age(&self) -> String {
        self.members.clone().unwrap_or_else(|| "never".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
