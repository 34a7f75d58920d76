//! Token Store: account records and the four-variant token lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::agent::UserAgentParser;
use crate::cache::MetadataCache;
use crate::config::TokenConfig;
use crate::error::{AuthError, StoreError};
use crate::session::overlay::SessionOverlay;
use crate::store::RecordStore;

use super::models::{
    Account, AccountRecord, AccountResetToken, EmailRecord, KeyFetchToken, NewAccount,
    NewSecurityEvent, PasswordForgotToken, ResetAccountFields, SecurityEvent, SessionSeed,
    SessionToken, Token, TokenId,
};

const TOKEN_ID_BYTES: usize = 32;
const EMAIL_CODE_BYTES: usize = 16;
const MAX_TOKEN_ID_ATTEMPTS: usize = 3;

/// Outcome of an email verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyEmailOutcome {
    Verified,
    /// Verification had already happened; not an error.
    AlreadyVerified,
    /// The supplied code does not match; nothing changes.
    CodeMismatch,
}

/// CRUD and lifecycle rules for accounts, emails, and tokens.
///
/// Single-token reads always answer from the durable store; fresh telemetry
/// is the session component's concern. Deleting a session token also evicts
/// its cache entry and any device bound to it.
pub struct TokenStore {
    store: Arc<dyn RecordStore>,
    overlay: SessionOverlay,
    ua_parser: Arc<dyn UserAgentParser>,
    config: TokenConfig,
}

impl TokenStore {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn MetadataCache>,
        ua_parser: Arc<dyn UserAgentParser>,
        config: TokenConfig,
    ) -> Self {
        Self {
            store,
            overlay: SessionOverlay::new(cache),
            ua_parser,
            config,
        }
    }

    pub async fn create_account(&self, new: NewAccount) -> Result<AccountRecord, AuthError> {
        let now = Utc::now();
        let uid = new.uid.unwrap_or_else(Uuid::new_v4);
        let account = Account {
            uid,
            created_at: now,
            locale: new.locale,
            email_verified: new.email_verified,
            auth_salt: new.auth_salt,
            verify_hash: new.verify_hash,
            wrap_wrap_kb: new.wrap_wrap_kb,
        };
        let primary = EmailRecord {
            uid,
            email: new.email.clone(),
            normalized_email: normalize_email(&new.email),
            verify_code: generate_email_code()?,
            is_verified: new.email_verified,
            is_primary: true,
            created_at: now,
        };
        match self.store.insert_account(&account, &primary).await {
            Ok(()) => Ok(AccountRecord {
                account,
                primary_email: primary.clone(),
                emails: vec![primary],
            }),
            Err(StoreError::AlreadyExists) => Err(AuthError::AccountExists),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn account(&self, uid: Uuid) -> Result<Account, AuthError> {
        self.store
            .account(uid)
            .await?
            .ok_or(AuthError::AccountNotFound)
    }

    /// Whether any account owns this email. Absence is an answer here, not
    /// an error.
    pub async fn account_exists(&self, email: &str) -> Result<bool, AuthError> {
        let normalized = normalize_email(email);
        Ok(self.store.email_by_normalized(&normalized).await?.is_some())
    }

    pub async fn email_record(&self, email: &str) -> Result<EmailRecord, AuthError> {
        let normalized = normalize_email(email);
        self.store
            .email_by_normalized(&normalized)
            .await?
            .ok_or(AuthError::AccountNotFound)
    }

    /// Account view reachable through any of its emails, secondary included.
    pub async fn account_record(&self, email: &str) -> Result<AccountRecord, AuthError> {
        let record = self.email_record(email).await?;
        self.assemble_account_record(record.uid).await
    }

    async fn assemble_account_record(&self, uid: Uuid) -> Result<AccountRecord, AuthError> {
        let account = self.account(uid).await?;
        let emails = self.store.emails_for_uid(uid).await?;
        let primary_email = emails
            .iter()
            .find(|record| record.is_primary)
            .cloned()
            .ok_or(AuthError::AccountNotFound)?;
        Ok(AccountRecord {
            account,
            emails,
            primary_email,
        })
    }

    /// Attach a secondary (unverified, non-primary) email to an account.
    pub async fn create_email(&self, uid: Uuid, email: &str) -> Result<EmailRecord, AuthError> {
        let _ = self.account(uid).await?;
        let record = EmailRecord {
            uid,
            email: email.to_string(),
            normalized_email: normalize_email(email),
            verify_code: generate_email_code()?,
            is_verified: false,
            is_primary: false,
            created_at: Utc::now(),
        };
        match self.store.insert_email(&record).await {
            Ok(()) => Ok(record),
            Err(StoreError::AlreadyExists) => Err(AuthError::AccountExists),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete_email(&self, uid: Uuid, email: &str) -> Result<(), AuthError> {
        let normalized = normalize_email(email);
        let record = self
            .store
            .email_by_normalized(&normalized)
            .await?
            .filter(|record| record.uid == uid)
            .ok_or(AuthError::AccountNotFound)?;
        if record.is_primary {
            return Err(AuthError::PrimaryEmailDeletion);
        }
        self.store.delete_email(uid, &normalized).await?;
        Ok(())
    }

    /// Flip the primary flag from the current primary to `email`.
    ///
    /// The store only guarantees per-row atomicity, so this is two writes;
    /// a reader in between sees the old primary still set.
    pub async fn set_primary_email(&self, uid: Uuid, email: &str) -> Result<(), AuthError> {
        let normalized = normalize_email(email);
        let mut target = self
            .store
            .email_by_normalized(&normalized)
            .await?
            .filter(|record| record.uid == uid)
            .ok_or(AuthError::AccountNotFound)?;
        if target.is_primary {
            return Ok(());
        }
        let emails = self.store.emails_for_uid(uid).await?;
        if let Some(mut previous) = emails.into_iter().find(|record| record.is_primary) {
            previous.is_primary = false;
            self.store.update_email(&previous).await?;
        }
        target.is_primary = true;
        self.store.update_email(&target).await?;
        Ok(())
    }

    /// Mark an email (and, for the primary, the account) verified, if the
    /// supplied code matches exactly.
    pub async fn verify_email(
        &self,
        record: &EmailRecord,
        code: &str,
    ) -> Result<VerifyEmailOutcome, AuthError> {
        let mut current = self
            .store
            .email_by_normalized(&record.normalized_email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        if current.is_verified {
            return Ok(VerifyEmailOutcome::AlreadyVerified);
        }
        if current.verify_code != code {
            return Ok(VerifyEmailOutcome::CodeMismatch);
        }
        current.is_verified = true;
        self.store.update_email(&current).await?;
        if current.is_primary {
            let mut account = self.account(current.uid).await?;
            account.email_verified = true;
            self.store.update_account(&account).await?;
        }
        Ok(VerifyEmailOutcome::Verified)
    }

    pub async fn create_session_token(
        &self,
        seed: &SessionSeed,
        raw_user_agent: &str,
    ) -> Result<SessionToken, AuthError> {
        let ua = self.ua_parser.parse(raw_user_agent);
        let now = Utc::now();
        let uid = seed.uid;
        let email = seed.email.clone();
        let must_verify = seed.verification_pending;
        let minted = self
            .insert_fresh(|id| {
                Token::Session(SessionToken {
                    id,
                    uid,
                    email: email.clone(),
                    created_at: now,
                    ua: ua.clone(),
                    last_access_at: now,
                    location: None,
                    must_verify,
                })
            })
            .await?;
        let Token::Session(session) = minted else {
            return Err(AuthError::Unexpected("token variant mismatch".to_string()));
        };
        Ok(session)
    }

    pub async fn create_key_fetch_token(
        &self,
        uid: Uuid,
        wrap_kb: Vec<u8>,
    ) -> Result<KeyFetchToken, AuthError> {
        let now = Utc::now();
        let minted = self
            .insert_fresh(|id| {
                Token::KeyFetch(KeyFetchToken {
                    id,
                    uid,
                    created_at: now,
                    wrap_kb: wrap_kb.clone(),
                })
            })
            .await?;
        let Token::KeyFetch(token) = minted else {
            return Err(AuthError::Unexpected("token variant mismatch".to_string()));
        };
        Ok(token)
    }

    pub async fn create_password_forgot_token(
        &self,
        record: &EmailRecord,
    ) -> Result<PasswordForgotToken, AuthError> {
        let now = Utc::now();
        let pass_code = generate_email_code()?;
        let uid = record.uid;
        let email = record.email.clone();
        let tries = self.config.password_forgot_tries();
        let minted = self
            .insert_fresh(|id| {
                Token::PasswordForgot(PasswordForgotToken {
                    id,
                    uid,
                    email: email.clone(),
                    created_at: now,
                    pass_code: pass_code.clone(),
                    tries,
                })
            })
            .await?;
        let Token::PasswordForgot(token) = minted else {
            return Err(AuthError::Unexpected("token variant mismatch".to_string()));
        };
        Ok(token)
    }

    pub async fn session_token(&self, id: &TokenId) -> Result<SessionToken, AuthError> {
        match self.live_token(id).await? {
            Token::Session(session) => Ok(session),
            _ => Err(AuthError::InvalidToken),
        }
    }

    pub async fn key_fetch_token(&self, id: &TokenId) -> Result<KeyFetchToken, AuthError> {
        match self.live_token(id).await? {
            Token::KeyFetch(token) => Ok(token),
            _ => Err(AuthError::InvalidToken),
        }
    }

    pub async fn password_forgot_token(
        &self,
        id: &TokenId,
    ) -> Result<PasswordForgotToken, AuthError> {
        match self.live_token(id).await? {
            Token::PasswordForgot(token) => Ok(token),
            _ => Err(AuthError::InvalidToken),
        }
    }

    pub async fn account_reset_token(&self, id: &TokenId) -> Result<AccountResetToken, AuthError> {
        match self.live_token(id).await? {
            Token::AccountReset(token) => Ok(token),
            _ => Err(AuthError::InvalidToken),
        }
    }

    /// Remove a session token, its cache entry, and any bound device.
    /// Idempotent: an absent identifier is not an error.
    pub async fn delete_session_token(&self, id: &TokenId) -> Result<(), AuthError> {
        match self.store.token(id).await? {
            Some(Token::Session(session)) => {
                self.store.delete_token(id).await?;
                self.store.delete_device_for_session(id).await?;
                self.overlay.evict_session(session.uid, id).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub async fn delete_key_fetch_token(&self, id: &TokenId) -> Result<(), AuthError> {
        if let Some(Token::KeyFetch(_)) = self.store.token(id).await? {
            self.store.delete_token(id).await?;
        }
        Ok(())
    }

    pub async fn delete_password_forgot_token(&self, id: &TokenId) -> Result<(), AuthError> {
        if let Some(Token::PasswordForgot(_)) = self.store.token(id).await? {
            self.store.delete_token(id).await?;
        }
        Ok(())
    }

    pub async fn delete_account_reset_token(&self, id: &TokenId) -> Result<(), AuthError> {
        if let Some(Token::AccountReset(_)) = self.store.token(id).await? {
            self.store.delete_token(id).await?;
        }
        Ok(())
    }

    /// Persist a mutated `tries` counter. The decrement-and-check policy
    /// belongs to the caller.
    pub async fn update_password_forgot_token(
        &self,
        token: &PasswordForgotToken,
    ) -> Result<(), AuthError> {
        match self
            .store
            .update_token(&Token::PasswordForgot(token.clone()))
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(AuthError::InvalidToken),
            Err(err) => Err(err.into()),
        }
    }

    /// Convert a verified forgot-password flow into a fresh account-reset
    /// token and retire the forgot-password token.
    pub async fn forgot_password_verified(
        &self,
        token: &PasswordForgotToken,
    ) -> Result<AccountResetToken, AuthError> {
        // The replacement must carry a strictly newer creation timestamp.
        let created_at = Utc::now().max(token.created_at + Duration::milliseconds(1));
        let uid = token.uid;
        let minted = self
            .insert_fresh(|id| {
                Token::AccountReset(AccountResetToken {
                    id,
                    uid,
                    created_at,
                })
            })
            .await?;
        self.store.delete_token(&token.id).await?;
        let Token::AccountReset(reset) = minted else {
            return Err(AuthError::Unexpected("token variant mismatch".to_string()));
        };
        Ok(reset)
    }

    /// Overwrite password-verification material and revoke every credential
    /// issued before the reset, device bindings included. Account and email
    /// rows survive.
    pub async fn reset_account(
        &self,
        token: &AccountResetToken,
        fields: ResetAccountFields,
    ) -> Result<(), AuthError> {
        let mut account = self.account(token.uid).await?;
        account.auth_salt = fields.auth_salt;
        account.verify_hash = fields.verify_hash;
        account.wrap_wrap_kb = fields.wrap_wrap_kb;
        self.store.update_account(&account).await?;
        self.store.delete_tokens_for_uid(token.uid).await?;
        self.store.delete_devices_for_uid(token.uid).await?;
        self.overlay.evict_all(token.uid).await;
        Ok(())
    }

    pub async fn delete_account(&self, record: &EmailRecord) -> Result<(), AuthError> {
        if !self.store.delete_account(record.uid).await? {
            return Err(AuthError::AccountNotFound);
        }
        self.overlay.evict_all(record.uid).await;
        Ok(())
    }

    pub async fn security_event(&self, event: NewSecurityEvent) -> Result<(), AuthError> {
        let event = SecurityEvent {
            uid: event.uid,
            name: event.name,
            ip_addr: event.ip_addr,
            token_id: event.token_id,
            created_at: Utc::now(),
        };
        self.store.append_security_event(&event).await?;
        Ok(())
    }

    pub async fn security_events(&self, uid: Uuid) -> Result<Vec<SecurityEvent>, AuthError> {
        Ok(self.store.security_events(uid).await?)
    }

    async fn live_token(&self, id: &TokenId) -> Result<Token, AuthError> {
        let token = self.store.token(id).await?.ok_or(AuthError::InvalidToken)?;
        // Expired rows answer exactly like absent ones.
        if token_expired(&token, &self.config, Utc::now()) {
            return Err(AuthError::InvalidToken);
        }
        Ok(token)
    }

    async fn insert_fresh<F>(&self, build: F) -> Result<Token, AuthError>
    where
        F: Fn(TokenId) -> Token,
    {
        for _ in 0..MAX_TOKEN_ID_ATTEMPTS {
            let token = build(generate_token_id()?);
            match self.store.insert_token(&token).await {
                Ok(()) => return Ok(token),
                Err(StoreError::AlreadyExists) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Err(AuthError::Unexpected(
            "failed to generate a unique token id".to_string(),
        ))
    }
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn session_expired(
    session: &SessionToken,
    config: &TokenConfig,
    now: DateTime<Utc>,
) -> bool {
    let ttl = if session.must_verify {
        Some(config.unverified_session_ttl_seconds())
    } else {
        config.session_lifetime_seconds()
    };
    expired_after(session.created_at, ttl, now)
}

pub(crate) fn expired_after(
    created_at: DateTime<Utc>,
    ttl_seconds: Option<i64>,
    now: DateTime<Utc>,
) -> bool {
    match ttl_seconds {
        None => false,
        Some(ttl) => created_at + Duration::seconds(ttl) <= now,
    }
}

fn token_expired(token: &Token, config: &TokenConfig, now: DateTime<Utc>) -> bool {
    match token {
        Token::Session(session) => session_expired(session, config, now),
        Token::KeyFetch(t) => expired_after(t.created_at, Some(config.key_fetch_ttl_seconds()), now),
        Token::PasswordForgot(t) => {
            expired_after(t.created_at, Some(config.password_forgot_ttl_seconds()), now)
        }
        Token::AccountReset(t) => {
            expired_after(t.created_at, Some(config.account_reset_ttl_seconds()), now)
        }
    }
}

fn generate_token_id() -> Result<TokenId, AuthError> {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::Unexpected(format!("entropy source failed: {err}")))?;
    Ok(TokenId::from_bytes(&bytes))
}

fn generate_email_code() -> Result<String, AuthError> {
    let mut bytes = [0u8; EMAIL_CODE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::Unexpected(format!("entropy source failed: {err}")))?;
    Ok(hex::encode(bytes))
}
