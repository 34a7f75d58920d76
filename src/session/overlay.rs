//! Best-effort cache overlay for session telemetry.
//!
//! The cache holds one serialized array per uid covering all of that
//! account's sessions, updated via read-modify-write. Concurrent writers for
//! the same uid can clobber each other; last writer wins and that is
//! accepted for telemetry-grade data. Cache failures degrade to stale or
//! absent telemetry and are never surfaced to callers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::agent::UserAgentInfo;
use crate::cache::MetadataCache;
use crate::geo::Location;
use crate::tokens::models::TokenId;

/// Telemetry snapshot for one session, as stored in the cached array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedSession {
    pub id: TokenId,
    pub last_access_at: DateTime<Utc>,
    pub ua: UserAgentInfo,
    pub location: Option<Location>,
}

#[derive(Clone)]
pub struct SessionOverlay {
    cache: Arc<dyn MetadataCache>,
}

impl SessionOverlay {
    #[must_use]
    pub fn new(cache: Arc<dyn MetadataCache>) -> Self {
        Self { cache }
    }

    fn key(uid: Uuid) -> String {
        format!("sessions:{}", uid.simple())
    }

    /// Raw read; `None` covers miss, read failure, and undecodable entries.
    async fn read(&self, uid: Uuid) -> Option<Vec<CachedSession>> {
        match self.cache.get(&Self::key(uid)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entries) => Some(entries),
                Err(err) => {
                    warn!(%uid, "discarding undecodable session cache entry: {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(%uid, "session cache read failed: {err}");
                None
            }
        }
    }

    async fn write(&self, uid: Uuid, entries: &[CachedSession]) {
        match serde_json::to_string(entries) {
            Ok(raw) => {
                if let Err(err) = self.cache.set(&Self::key(uid), &raw).await {
                    warn!(%uid, "session cache write failed: {err}");
                }
            }
            Err(err) => warn!(%uid, "failed to serialize session cache entry: {err}"),
        }
    }

    /// Cached entries for a uid; empty on miss or failure.
    pub(crate) async fn load(&self, uid: Uuid) -> Vec<CachedSession> {
        self.read(uid).await.unwrap_or_default()
    }

    /// Upsert one session's telemetry, preserving sibling entries.
    pub(crate) async fn record(&self, uid: Uuid, entry: CachedSession) {
        let mut entries = self.load(uid).await;
        match entries.iter_mut().find(|cached| cached.id == entry.id) {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }
        self.write(uid, &entries).await;
    }

    /// Drop one session from the cached array, keeping its siblings.
    pub(crate) async fn evict_session(&self, uid: Uuid, id: &TokenId) {
        if let Some(entries) = self.read(uid).await {
            let remaining: Vec<CachedSession> =
                entries.into_iter().filter(|cached| &cached.id != id).collect();
            self.write(uid, &remaining).await;
        }
    }

    /// Clear the whole per-uid entry (account deletion or reset).
    pub(crate) async fn evict_all(&self, uid: Uuid) {
        if let Err(err) = self.cache.delete(&Self::key(uid)).await {
            warn!(%uid, "session cache delete failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CachedSession, SessionOverlay};
    use crate::agent::UserAgentInfo;
    use crate::cache::{MemoryCache, MetadataCache};
    use crate::error::CacheError;
    use crate::tokens::models::TokenId;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    struct DownCache;

    #[async_trait]
    impl MetadataCache for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(CacheError("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError("connection refused".to_string()))
        }
    }

    fn entry(id: &str) -> CachedSession {
        CachedSession {
            id: TokenId::from(id),
            last_access_at: Utc::now(),
            ua: UserAgentInfo::default(),
            location: None,
        }
    }

    #[tokio::test]
    async fn record_preserves_siblings() {
        let overlay = SessionOverlay::new(Arc::new(MemoryCache::new()));
        let uid = Uuid::new_v4();
        overlay.record(uid, entry("aa")).await;
        overlay.record(uid, entry("bb")).await;

        let entries = overlay.load(uid).await;
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn record_replaces_existing_entry_in_place() {
        let overlay = SessionOverlay::new(Arc::new(MemoryCache::new()));
        let uid = Uuid::new_v4();
        overlay.record(uid, entry("aa")).await;

        let mut updated = entry("aa");
        updated.ua.browser = Some("Firefox".to_string());
        overlay.record(uid, updated).await;

        let entries = overlay.load(uid).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ua.browser.as_deref(), Some("Firefox"));
    }

    #[tokio::test]
    async fn evict_session_leaves_siblings_untouched() {
        let overlay = SessionOverlay::new(Arc::new(MemoryCache::new()));
        let uid = Uuid::new_v4();
        overlay.record(uid, entry("aa")).await;
        overlay.record(uid, entry("bb")).await;
        overlay.record(uid, entry("cc")).await;

        overlay.evict_session(uid, &TokenId::from("bb")).await;
        let entries = overlay.load(uid).await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|cached| cached.id.as_str() != "bb"));
    }

    #[tokio::test]
    async fn evict_all_clears_the_entry() {
        let overlay = SessionOverlay::new(Arc::new(MemoryCache::new()));
        let uid = Uuid::new_v4();
        overlay.record(uid, entry("aa")).await;
        overlay.evict_all(uid).await;
        assert!(overlay.load(uid).await.is_empty());
    }

    #[tokio::test]
    async fn cache_outage_degrades_to_empty() {
        let overlay = SessionOverlay::new(Arc::new(DownCache));
        let uid = Uuid::new_v4();
        // None of these may panic or surface an error.
        overlay.record(uid, entry("aa")).await;
        overlay.evict_session(uid, &TokenId::from("aa")).await;
        overlay.evict_all(uid).await;
        assert!(overlay.load(uid).await.is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_is_discarded() {
        let cache = Arc::new(MemoryCache::new());
        let uid = Uuid::new_v4();
        cache
            .set(&format!("sessions:{}", uid.simple()), "not json")
            .await
            .unwrap();
        let overlay = SessionOverlay::new(cache);
        assert!(overlay.load(uid).await.is_empty());
    }
}
