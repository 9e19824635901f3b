// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Discovery caches with TTL expiry.
//!
//! Tool and resource catalogs are cached per (user, server) so discovery
//! queries do not need a live connection per user. Capabilities are cached
//! per server with a shorter lifetime and shared by every user. Entries
//! expire; nothing is invalidated explicitly except by list-changed
//! refreshes, which overwrite.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::mcp::types::{Resource, ServerCapabilities, Tool};

/// Default catalog TTL (30 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Default capability TTL (5 minutes).
pub const DEFAULT_CAPABILITY_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Thread-safe map whose entries expire after a fixed TTL.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any. Expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if !entry.is_expired(self.ttl) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                CacheEntry {
                    value,
                    created_at: Instant::now(),
                },
            );
    }

    pub fn remove(&self, key: &K) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key for per-user catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserServerKey {
    pub user: String,
    pub server: String,
}

impl UserServerKey {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }
}

/// All discovery caches owned by one session manager.
pub struct DiscoveryCache {
    pub tools: TtlCache<UserServerKey, Vec<Tool>>,
    pub resources: TtlCache<UserServerKey, Vec<Resource>>,
    pub capabilities: TtlCache<String, ServerCapabilities>,
}

impl DiscoveryCache {
    pub fn new(catalog_ttl: Duration, capability_ttl: Duration) -> Self {
        Self {
            tools: TtlCache::new(catalog_ttl),
            resources: TtlCache::new(catalog_ttl),
            capabilities: TtlCache::new(capability_ttl),
        }
    }

    /// Drop expired entries from every cache.
    pub fn prune(&self) -> usize {
        self.tools.prune() + self.resources.prune() + self.capabilities.prune()
    }

    pub fn clear(&self) {
        self.tools.clear();
        self.resources.clear();
        self.capabilities.clear();
    }
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CAPABILITY_TTL)
    }
}
