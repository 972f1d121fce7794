//! Shared state for one CLI invocation: config, API client, session and cache.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use bastu_core::api::enrich_members;
use bastu_core::cache::PASSPHRASE_ENV;
use bastu_core::models::{Member, MemberRelation, SmsGroup, VisitStats};
use bastu_core::{
    AdminSession, ApiClient, CacheCipher, CacheManager, Config, Contact, CredentialStore,
    SessionStore,
};

/// Where the member directory came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Live,
    /// Cached data and its age
    Cache(String),
}

pub struct Directory {
    pub members: Vec<Member>,
    pub source: DataSource,
}

pub struct App {
    pub config: Config,
    api: ApiClient,
    sessions: SessionStore,
    cache_dir: PathBuf,
    /// Cache passphrase; `None` uses the keychain key.
    passphrase: Option<String>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let passphrase = std::env::var(PASSPHRASE_ENV).ok().filter(|p| !p.is_empty());
        Self::with_cache_dir(config, cache_dir, passphrase)
    }

    pub fn with_cache_dir(
        config: Config,
        cache_dir: PathBuf,
        passphrase: Option<String>,
    ) -> Result<Self> {
        let (url, key) = config.backend()?;
        let api = ApiClient::new(url, key)?;
        debug!(?cache_dir, "Cache directory configured");
        let sessions = SessionStore::new(cache_dir.clone());

        Ok(Self {
            config,
            api,
            sessions,
            cache_dir,
            passphrase,
        })
    }

    /// Open the encrypted cache. Failing to get a key is not fatal for
    /// online commands, so callers decide how to treat the error.
    pub fn cache(&self) -> Result<CacheManager> {
        let cipher = CacheCipher::for_cache_dir(&self.cache_dir, self.passphrase.as_deref())
            .context("Cache key unavailable")?;
        CacheManager::new(self.cache_dir.clone(), cipher)
    }

    fn cache_or_warn(&self) -> Option<CacheManager> {
        match self.cache() {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Offline cache disabled");
                None
            }
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Run the one-time code login and keep the session if it belongs to an admin.
    pub async fn login(&mut self, contact: Contact) -> Result<AdminSession> {
        self.api.request_otp(&contact).await?;
        println!("A login code was sent to your {}.", contact);

        let code = prompt_code()?;
        let session = self.api.verify_otp(&contact, &code).await?;

        let api = self.api.with_session(&session);
        if !api.is_admin().await.context("Failed to check admin role")? {
            bail!("{} is not an administrator", contact);
        }

        if let Err(e) = CredentialStore::store_refresh_token(contact.as_str(), &session.refresh_token) {
            warn!(error = %e, "Failed to store refresh token");
        }
        self.sessions.save(&session).context("Failed to save session")?;

        self.config.last_contact = Some(contact);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        info!(user_id = %session.user_id, "Login successful");
        Ok(session)
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Some(session) = self.sessions.load()? {
            if let Err(e) = CredentialStore::delete(session.contact.as_str()) {
                debug!(error = %e, "No stored refresh token to delete");
            }
        }
        self.sessions.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// The saved session, refreshed first when it is close to expiry.
    pub async fn session(&self) -> Result<AdminSession> {
        let Some(session) = self.sessions.load()? else {
            bail!("Not logged in; run `bastu login`");
        };
        let now = Utc::now();
        if !session.needs_refresh(now) {
            return Ok(session);
        }

        let refresh_token = CredentialStore::get_refresh_token(session.contact.as_str())
            .unwrap_or_else(|_| session.refresh_token.clone());
        match self.api.refresh_session(&refresh_token, &session.contact).await {
            Ok(fresh) => {
                debug!(expires_at = %fresh.expires_at, "Session refreshed");
                if let Err(e) =
                    CredentialStore::store_refresh_token(fresh.contact.as_str(), &fresh.refresh_token)
                {
                    warn!(error = %e, "Failed to store refresh token");
                }
                self.sessions.save(&fresh)?;
                Ok(fresh)
            }
            Err(e) if session.is_expired(now) => {
                Err(e.context("Session expired; run `bastu login`"))
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed, using current token");
                Ok(session)
            }
        }
    }

    /// A client acting as the logged-in admin.
    pub async fn api(&self) -> Result<ApiClient> {
        let session = self.session().await?;
        Ok(self.api.with_session(&session))
    }

    // =========================================================================
    // Data loading
    // =========================================================================

    /// Members with visit stats and relations merged in.
    ///
    /// Fetches live unless `offline` is set, caching what it gets. Falls back
    /// to the cache when the backend cannot be reached.
    pub async fn load_directory(&self, offline: bool) -> Result<Directory> {
        let cache = self.cache_or_warn();

        if !offline {
            match self.fetch_directory().await {
                Ok((members, stats, relations)) => {
                    if let Some(cache) = &cache {
                        for (name, result) in [
                            ("members", cache.save_members(&members)),
                            ("visit_stats", cache.save_visit_stats(&stats)),
                            ("relations", cache.save_relations(&relations)),
                        ] {
                            if let Err(e) = result {
                                warn!(cache = name, error = %e, "Failed to cache data");
                            }
                        }
                    }
                    return Ok(Directory {
                        members: enrich_members(members, &stats, &relations),
                        source: DataSource::Live,
                    });
                }
                Err(e) if cache.is_some() => {
                    warn!(error = %e, "Fetch failed, falling back to cache");
                }
                Err(e) => return Err(e),
            }
        }

        let cache = cache.context("No cache available")?;
        let members = cache
            .load_members()?
            .context("No cached members; run once while online")?;
        let stats = cache.load_visit_stats()?.map(|c| c.data).unwrap_or_default();
        let relations = cache.load_relations()?.map(|c| c.data).unwrap_or_default();
        if members.is_stale() {
            debug!(age = %members.age_display(), "Cached members are stale");
        }

        Ok(Directory {
            source: DataSource::Cache(members.age_display()),
            members: enrich_members(members.data, &stats, &relations),
        })
    }

    async fn fetch_directory(&self) -> Result<(Vec<Member>, Vec<VisitStats>, Vec<MemberRelation>)> {
        let api = self.api().await?;
        let (members, stats, relations) = tokio::join!(
            api.fetch_members(),
            api.fetch_visit_stats(),
            api.fetch_relations(),
        );
        let members = members?;
        // The list is still useful without counts or links
        let stats = stats.unwrap_or_else(|e| {
            warn!(error = %e, "Visit stats unavailable");
            Vec::new()
        });
        let relations = relations.unwrap_or_else(|e| {
            warn!(error = %e, "Member relations unavailable");
            Vec::new()
        });
        debug!(members = members.len(), stats = stats.len(), relations = relations.len(), "Directory fetched");
        Ok((members, stats, relations))
    }

    pub async fn load_groups(&self, api: &ApiClient) -> Result<Vec<SmsGroup>> {
        let cache = self.cache_or_warn();
        match api.fetch_sms_groups().await {
            Ok(groups) => {
                if let Some(cache) = &cache {
                    if let Err(e) = cache.save_sms_groups(&groups) {
                        warn!(error = %e, "Failed to cache SMS groups");
                    }
                }
                Ok(groups)
            }
            Err(e) => match cache.and_then(|c| c.load_sms_groups().ok().flatten()) {
                Some(cached) => {
                    warn!(error = %e, age = %cached.age_display(), "Using cached SMS groups");
                    Ok(cached.data)
                }
                None => Err(e),
            },
        }
    }
}

fn prompt_code() -> Result<String> {
    io::stdout().flush()?;
    let code = rpassword::prompt_password("Code: ")?;
    let code = code.trim().to_string();
    if code.is_empty() {
        bail!("No code entered");
    }
    Ok(code)
}
