//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing and retrieving
//! backend rows locally. Data is cached as encrypted JSON and considered
//! stale after 60 minutes.
//!
//! Cached data types include:
//! - Members, visit stats and medbadare relations
//! - Access events
//! - SMS groups

pub mod crypto;
pub mod manager;

pub use crypto::{CacheCipher, CacheError, PASSPHRASE_ENV};
pub use manager::{CacheAges, CacheManager, CachedData};
