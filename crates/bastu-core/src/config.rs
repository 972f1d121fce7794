//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend project URL, its public anon key and the
//! last contact used to log in.
//!
//! Configuration is stored at `~/.config/bastu/config.json`. The
//! `BASTU_URL` and `BASTU_ANON_KEY` environment variables override the
//! file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::Contact;
use crate::models::VisitPeriod;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "bastu";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const URL_ENV: &str = "BASTU_URL";
pub const ANON_KEY_ENV: &str = "BASTU_ANON_KEY";

/// Heading used when no organization name is configured.
const DEFAULT_ORGANIZATION: &str = "Bastuklubben";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub base_url: Option<String>,
    pub anon_key: Option<String>,
    #[serde(default)]
    pub default_period: VisitPeriod,
    pub organization_name: Option<String>,
    pub last_contact: Option<Contact>,
}

impl Config {
    /// Load the config file and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url.trim().to_string());
        }
        if let Some(key) = var(ANON_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.anon_key = Some(key.trim().to_string());
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Project URL and anon key, or an error naming what is missing.
    pub fn backend(&self) -> Result<(&str, &str)> {
        let url = self
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No backend URL configured; set {}", URL_ENV))?;
        let key = self
            .anon_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No anon key configured; set {}", ANON_KEY_ENV))?;
        Ok((url, key))
    }

    /// Club name for output headings.
    pub fn organization(&self) -> &str {
        self.organization_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ORGANIZATION)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(project) = self.base_url.as_deref().and_then(project_ref) {
            path = path.join(project);
        }
        Ok(path)
    }
}

/// First DNS label of the project URL, e.g. `abcd` for `https://abcd.example.co`.
fn project_ref(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split(['/', ':']).next()?;
    let label = host.split('.').next()?;
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}
