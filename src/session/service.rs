//! Last-access telemetry: gated cache writes and merged session views.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::agent::UserAgentParser;
use crate::cache::MetadataCache;
use crate::config::{LastAccessConfig, TokenConfig};
use crate::error::AuthError;
use crate::geo::GeoResolver;
use crate::store::RecordStore;
use crate::tokens::models::SessionToken;
use crate::tokens::service::session_expired;

use super::overlay::{CachedSession, SessionOverlay};

/// Session views with fresh telemetry.
///
/// Writes go to the cache only; the durable row keeps whatever telemetry it
/// was created with. [`sessions`](SessionDirectory::sessions) merges the two,
/// while single-token lookups on the [`TokenStore`](crate::tokens::TokenStore)
/// stay durable-only to keep the authentication hot path cache-free.
pub struct SessionDirectory {
    store: Arc<dyn RecordStore>,
    overlay: SessionOverlay,
    geo: Arc<dyn GeoResolver>,
    ua_parser: Arc<dyn UserAgentParser>,
    config: LastAccessConfig,
    token_config: TokenConfig,
}

impl SessionDirectory {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn MetadataCache>,
        geo: Arc<dyn GeoResolver>,
        ua_parser: Arc<dyn UserAgentParser>,
        config: LastAccessConfig,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            store,
            overlay: SessionOverlay::new(cache),
            geo,
            ua_parser,
            config,
            token_config,
        }
    }

    /// Record fresh last-access telemetry for one session.
    ///
    /// Skipped entirely when the feature is disabled, the sampling draw
    /// misses, or the account email is outside the eligible pattern; in
    /// those cases the cache is left byte-for-byte unchanged. Geolocation is
    /// best-effort. Returns whether an update was written.
    pub async fn update_session_token(
        &self,
        token: &SessionToken,
        raw_user_agent: Option<&str>,
        ip: Option<&str>,
    ) -> bool {
        if !self.config.enabled() || !self.sampled() || !self.config.email_eligible(&token.email) {
            return false;
        }

        let ua = match raw_user_agent {
            Some(raw) => self.ua_parser.parse(raw),
            None => token.ua.clone(),
        };
        let location = match ip {
            Some(ip) => match self.geo.resolve(ip).await {
                Ok(location) => Some(location),
                Err(err) => {
                    debug!(uid = %token.uid, "proceeding without location: {err}");
                    None
                }
            },
            None => token.location.clone(),
        };

        let entry = CachedSession {
            id: token.id.clone(),
            last_access_at: Utc::now(),
            ua,
            location,
        };
        self.overlay.record(token.uid, entry).await;
        true
    }

    /// All live sessions for a uid, cached telemetry overriding durable
    /// fields. A cache miss or outage degrades to the durable rows.
    pub async fn sessions(&self, uid: Uuid) -> Result<Vec<SessionToken>, AuthError> {
        let now = Utc::now();
        let rows = self.store.session_tokens_for_uid(uid).await?;
        let live: Vec<SessionToken> = rows
            .into_iter()
            .filter(|session| !session_expired(session, &self.token_config, now))
            .collect();
        let cached = self.overlay.load(uid).await;
        Ok(merge_sessions(live, &cached))
    }

    fn sampled(&self) -> bool {
        let rate = self.config.sample_rate();
        rate >= 1.0 || rand::thread_rng().gen::<f64>() < rate
    }
}

/// Overlay cached telemetry onto durable session rows. Rows without a cache
/// entry keep their own (possibly stale) fields.
pub(crate) fn merge_sessions(
    rows: Vec<SessionToken>,
    cached: &[CachedSession],
) -> Vec<SessionToken> {
    rows.into_iter()
        .map(|mut session| {
            if let Some(entry) = cached.iter().find(|entry| entry.id == session.id) {
                session.last_access_at = entry.last_access_at;
                session.ua = entry.ua.clone();
                session.location = entry.location.clone();
            }
            session
        })
        .collect()
}
