//! End-to-end flows across the token store, session directory, device
//! registry, and one-time codes, sharing one store and one cache.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gardisto::agent::{BasicUserAgentParser, DeviceType};
use gardisto::cache::{MemoryCache, MetadataCache};
use gardisto::codes::{OneTimeCodes, RandomCodes};
use gardisto::config::{LastAccessConfig, TokenConfig};
use gardisto::devices::{DeviceInfo, DeviceRegistry};
use gardisto::error::{AuthError, GeoError};
use gardisto::geo::{GeoResolver, Location};
use gardisto::session::SessionDirectory;
use gardisto::store::MemoryStore;
use gardisto::tokens::models::{AccountRecord, NewAccount, NewSecurityEvent, SessionSeed};
use gardisto::tokens::TokenStore;
use uuid::Uuid;

const DESKTOP_FIREFOX: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:41.0) Gecko/20100101 Firefox/41.0";
const MOBILE_FIREFOX: &str = "Mozilla/5.0 (Android 4.4; Mobile; rv:41.0) Gecko/41.0 Firefox/41.0";

struct StaticGeo;

#[async_trait]
impl GeoResolver for StaticGeo {
    async fn resolve(&self, _ip: &str) -> Result<Location, GeoError> {
        Ok(Location {
            city: Some("Portland".to_string()),
            state: Some("OR".to_string()),
            country: Some("US".to_string()),
            time_zone: Some("America/Los_Angeles".to_string()),
        })
    }
}

struct Core {
    cache: Arc<MemoryCache>,
    tokens: TokenStore,
    sessions: SessionDirectory,
    devices: DeviceRegistry,
    codes: OneTimeCodes,
}

fn core_with(last_access: LastAccessConfig) -> Core {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let config = TokenConfig::new();
    let parser = Arc::new(BasicUserAgentParser);

    let tokens = TokenStore::new(store.clone(), cache.clone(), parser.clone(), config.clone());
    let sessions = SessionDirectory::new(
        store.clone(),
        cache.clone(),
        Arc::new(StaticGeo),
        parser,
        last_access,
        config.clone(),
    );
    let devices = DeviceRegistry::new(store.clone(), cache.clone(), config.clone());
    let codes = OneTimeCodes::new(store, Arc::new(RandomCodes), config);

    Core {
        cache,
        tokens,
        sessions,
        devices,
        codes,
    }
}

fn core() -> Core {
    core_with(LastAccessConfig::new())
}

async fn verified_account(core: &Core, email: &str) -> Result<AccountRecord> {
    core.tokens
        .create_account(NewAccount::new(email).with_email_verified(true))
        .await
        .context("create account")
}

fn cache_key(uid: Uuid) -> String {
    format!("sessions:{}", uid.simple())
}

#[tokio::test]
async fn account_exists_tracks_create_and_delete() -> Result<()> {
    let core = core();
    assert!(!core.tokens.account_exists("flow@example.com").await?);

    let record = verified_account(&core, "flow@example.com").await?;
    assert!(core.tokens.account_exists("flow@example.com").await?);

    core.tokens
        .security_event(NewSecurityEvent {
            uid: record.account.uid,
            name: "account.create".to_string(),
            ip_addr: "203.0.113.5".to_string(),
            token_id: None,
        })
        .await?;
    let events = core.tokens.security_events(record.account.uid).await?;
    assert_eq!(events.len(), 1);

    core.tokens.delete_account(&record.primary_email).await?;
    assert!(!core.tokens.account_exists("flow@example.com").await?);
    Ok(())
}

#[tokio::test]
async fn fresh_telemetry_shows_in_sessions_but_not_in_single_token_reads() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "asym@example.com").await?;
    let uid = record.account.uid;
    let session = core
        .tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;
    assert_eq!(session.ua.device_type, Some(DeviceType::Desktop));

    assert!(
        core.sessions
            .update_session_token(&session, Some(MOBILE_FIREFOX), Some("203.0.113.1"))
            .await
    );

    // The merged listing reflects the update.
    let listed = core.sessions.sessions(uid).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].ua.device_type, Some(DeviceType::Mobile));
    assert_eq!(
        listed[0].location.as_ref().and_then(|l| l.city.as_deref()),
        Some("Portland")
    );
    assert!(listed[0].last_access_at > session.last_access_at);

    // The single-token read still answers from the durable row.
    let durable = core.tokens.session_token(&session.id).await?;
    assert_eq!(durable.ua.device_type, Some(DeviceType::Desktop));
    assert_eq!(durable.location, None);
    assert_eq!(durable.last_access_at, session.last_access_at);
    Ok(())
}

#[tokio::test]
async fn disabled_updates_leave_the_cache_byte_for_byte_unchanged() -> Result<()> {
    let core = core_with(LastAccessConfig::new().with_enabled(false));
    let record = verified_account(&core, "frozen@example.com").await?;
    let uid = record.account.uid;
    let session = core
        .tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;

    // Seed a sentinel value so a write would be detectable.
    core.cache.set(&cache_key(uid), "[{\"sentinel\":true}]").await?;
    assert!(
        !core
            .sessions
            .update_session_token(&session, Some(MOBILE_FIREFOX), Some("203.0.113.1"))
            .await
    );
    assert_eq!(
        core.cache.get(&cache_key(uid)).await?.as_deref(),
        Some("[{\"sentinel\":true}]")
    );
    Ok(())
}

#[tokio::test]
async fn deleting_one_session_keeps_sibling_cache_entries_intact() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "siblings@example.com").await?;
    let uid = record.account.uid;
    let seed = SessionSeed::from(&record.primary_email);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let session = core
            .tokens
            .create_session_token(&seed, DESKTOP_FIREFOX)
            .await?;
        assert!(
            core.sessions
                .update_session_token(&session, None, Some("203.0.113.1"))
                .await
        );
        ids.push(session.id);
    }

    let before = core.sessions.sessions(uid).await?;
    assert_eq!(before.len(), 3);

    core.tokens.delete_session_token(&ids[1]).await?;

    let raw = core
        .cache
        .get(&cache_key(uid))
        .await?
        .context("cache entry should survive")?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    assert_eq!(entries.len(), 2);

    let after = core.sessions.sessions(uid).await?;
    assert_eq!(after.len(), 2);
    for survivor in &after {
        let earlier = before
            .iter()
            .find(|s| s.id == survivor.id)
            .context("survivor should have existed before")?;
        assert_eq!(survivor, earlier);
    }
    assert!(after.iter().all(|s| s.id != ids[1]));
    Ok(())
}

#[tokio::test]
async fn device_views_track_cached_telemetry() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "viewer@example.com").await?;
    let uid = record.account.uid;
    let session = core
        .tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;

    let view = core
        .devices
        .create_device(uid, &session.id, DeviceInfo::named("Workstation"))
        .await?;
    assert_eq!(view.ua.device_type, Some(DeviceType::Desktop));

    core.sessions
        .update_session_token(&session, Some(MOBILE_FIREFOX), Some("203.0.113.1"))
        .await;

    let views = core.devices.devices(uid).await?;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].ua.device_type, Some(DeviceType::Mobile));
    assert_eq!(
        views[0].location.as_ref().and_then(|l| l.city.as_deref()),
        Some("Portland")
    );
    Ok(())
}

#[tokio::test]
async fn second_device_conflict_reports_the_first_binding() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "twodevices@example.com").await?;
    let uid = record.account.uid;
    let session = core
        .tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;

    let first = core
        .devices
        .create_device(uid, &session.id, DeviceInfo::named("First"))
        .await?;
    let err = core
        .devices
        .create_device(uid, &session.id, DeviceInfo::named("Second"))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), 124);
    match err {
        AuthError::DeviceConflict { device_id } => assert_eq!(device_id, first.device.id),
        other => panic!("expected DeviceConflict, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn deleting_a_session_token_unbinds_its_device() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "unbind@example.com").await?;
    let uid = record.account.uid;
    let session = core
        .tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;
    core.devices
        .create_device(uid, &session.id, DeviceInfo::named("Tied"))
        .await?;

    core.tokens.delete_session_token(&session.id).await?;
    assert!(core.devices.devices(uid).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reset_revokes_tokens_and_devices_but_keeps_the_account() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "reset@example.com").await?;
    let uid = record.account.uid;
    let session = core
        .tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;
    core.devices
        .create_device(uid, &session.id, DeviceInfo::named("Old phone"))
        .await?;
    core.sessions
        .update_session_token(&session, None, Some("203.0.113.1"))
        .await;

    let forgot = core
        .tokens
        .create_password_forgot_token(&record.primary_email)
        .await?;
    let reset = core.tokens.forgot_password_verified(&forgot).await?;
    assert!(reset.created_at > forgot.created_at);

    core.tokens
        .reset_account(
            &reset,
            gardisto::tokens::models::ResetAccountFields {
                auth_salt: vec![1; 32],
                verify_hash: vec![2; 32],
                wrap_wrap_kb: vec![3; 32],
            },
        )
        .await?;

    // Account and emails survive; credentials and telemetry do not.
    let after = core.tokens.account_record("reset@example.com").await?;
    assert_eq!(after.account.uid, uid);
    assert_eq!(after.account.verify_hash, vec![2; 32]);
    assert!(matches!(
        core.tokens.session_token(&session.id).await.unwrap_err(),
        AuthError::InvalidToken
    ));
    assert!(core.sessions.sessions(uid).await?.is_empty());
    assert!(core.devices.devices(uid).await?.is_empty());
    assert_eq!(core.cache.get(&cache_key(uid)).await?, None);
    Ok(())
}

#[tokio::test]
async fn secondary_email_resolves_the_same_account_record() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "e1@example.com").await?;
    core.tokens
        .create_email(record.account.uid, "e2@example.com")
        .await?;

    let by_primary = core.tokens.account_record("e1@example.com").await?;
    let by_secondary = core.tokens.account_record("e2@example.com").await?;
    assert_eq!(by_primary.primary_email.email, "e1@example.com");
    assert_eq!(by_primary.primary_email, by_secondary.primary_email);
    assert_eq!(by_primary.emails, by_secondary.emails);
    Ok(())
}

#[tokio::test]
async fn one_time_codes_are_one_time() -> Result<()> {
    let core = core();
    let record = verified_account(&core, "once@example.com").await?;
    let uid = record.account.uid;

    let unblock = core.codes.create_unblock_code(uid).await?;
    core.codes.consume_unblock_code(uid, &unblock).await?;
    let err = core
        .codes
        .consume_unblock_code(uid, &unblock)
        .await
        .unwrap_err();
    assert_eq!(err.errno(), 127);

    let signin = core
        .codes
        .create_signin_code(uid, Some("flow-7".to_string()))
        .await?;
    let consumed = core.codes.consume_signin_code(&signin).await?;
    assert_eq!(consumed.email, "once@example.com");
    assert_eq!(consumed.flow_id.as_deref(), Some("flow-7"));
    let err = core.codes.consume_signin_code(&signin).await.unwrap_err();
    assert_eq!(err.errno(), 146);
    assert_eq!(err.http_status(), 400);
    Ok(())
}

#[tokio::test]
async fn cache_outage_degrades_session_listings_to_durable_rows() -> Result<()> {
    // Build a core whose cache refuses every call.
    struct DownCache;

    #[async_trait]
    impl MetadataCache for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, gardisto::CacheError> {
            Err(gardisto::CacheError("boom".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<(), gardisto::CacheError> {
            Err(gardisto::CacheError("boom".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<(), gardisto::CacheError> {
            Err(gardisto::CacheError("boom".to_string()))
        }
    }

    let store = Arc::new(MemoryStore::new());
    let cache: Arc<DownCache> = Arc::new(DownCache);
    let config = TokenConfig::new();
    let parser = Arc::new(BasicUserAgentParser);
    let tokens = TokenStore::new(store.clone(), cache.clone(), parser.clone(), config.clone());
    let sessions = SessionDirectory::new(
        store,
        cache,
        Arc::new(StaticGeo),
        parser,
        LastAccessConfig::new(),
        config,
    );

    let record = tokens
        .create_account(NewAccount::new("degraded@example.com").with_email_verified(true))
        .await?;
    let session = tokens
        .create_session_token(&SessionSeed::from(&record.primary_email), DESKTOP_FIREFOX)
        .await?;

    // The write is swallowed; the listing falls back to durable telemetry.
    sessions
        .update_session_token(&session, Some(MOBILE_FIREFOX), Some("203.0.113.1"))
        .await;
    let listed = sessions.sessions(record.account.uid).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].ua.device_type, Some(DeviceType::Desktop));
    Ok(())
}
