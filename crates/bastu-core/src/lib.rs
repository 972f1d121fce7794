//! bastu-core: shared logic for the sauna club admin tools.
//!
//! The backend owns the data. This crate fetches it, decides which
//! category each member belongs to, prepares the member list for display
//! and wraps the messaging, access-log and AI-chat features:
//!
//! - [`api`]: typed client for tables, procedures, auth and edge functions
//! - [`classify`], [`display`], [`identity`]: member directory rules
//! - [`access`], [`sms`], [`chat`], [`ranking`]: admin features
//! - [`realtime`]: change subscriptions
//! - [`auth`], [`cache`], [`config`]: session, offline storage and settings

pub mod access;
pub mod api;
pub mod auth;
pub mod cache;
pub mod chat;
pub mod classify;
pub mod config;
pub mod display;
pub mod identity;
pub mod models;
pub mod ranking;
pub mod realtime;
pub mod sms;
pub mod utils;

pub use api::{enrich_members, ApiClient, ApiError};
pub use auth::{AdminSession, Contact, CredentialStore, SessionStore};
pub use cache::{CacheCipher, CacheManager};
pub use classify::{categorize, classify};
pub use config::Config;
pub use display::{resolve_display_list, DisplayOptions, MemberFilter, SortDirection, SortKey};
pub use ranking::RankingService;
