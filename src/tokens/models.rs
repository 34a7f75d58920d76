//! Account, email, and token records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::UserAgentInfo;
use crate::geo::Location;

/// Opaque token identifier, unique across the whole token namespace.
///
/// Lookup by bare identifier resolves to exactly one token and kind, so the
/// four variants share a single id space.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TokenId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TokenId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Durable account row. The uid is immutable and globally unique.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub uid: Uuid,
    pub created_at: DateTime<Utc>,
    pub locale: Option<String>,
    pub email_verified: bool,
    pub auth_salt: Vec<u8>,
    pub verify_hash: Vec<u8>,
    pub wrap_wrap_kb: Vec<u8>,
}

/// Input for account creation.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub uid: Option<Uuid>,
    pub locale: Option<String>,
    pub email_verified: bool,
    pub auth_salt: Vec<u8>,
    pub verify_hash: Vec<u8>,
    pub wrap_wrap_kb: Vec<u8>,
}

impl NewAccount {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            uid: None,
            locale: None,
            email_verified: false,
            auth_salt: Vec::new(),
            verify_hash: Vec::new(),
            wrap_wrap_kb: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_uid(mut self, uid: Uuid) -> Self {
        self.uid = Some(uid);
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }

    #[must_use]
    pub fn with_password_material(
        mut self,
        auth_salt: Vec<u8>,
        verify_hash: Vec<u8>,
        wrap_wrap_kb: Vec<u8>,
    ) -> Self {
        self.auth_salt = auth_salt;
        self.verify_hash = verify_hash;
        self.wrap_wrap_kb = wrap_wrap_kb;
        self
    }
}

/// Replacement password-verification material for an account reset.
#[derive(Clone, Debug)]
pub struct ResetAccountFields {
    pub auth_salt: Vec<u8>,
    pub verify_hash: Vec<u8>,
    pub wrap_wrap_kb: Vec<u8>,
}

/// One email row. The normalized form is unique across all accounts and
/// exactly one row per uid carries `is_primary`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub uid: Uuid,
    pub email: String,
    pub normalized_email: String,
    pub verify_code: String,
    pub is_verified: bool,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Read-time composite: the account plus its full email set. A view, not a
/// stored entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: Account,
    pub emails: Vec<EmailRecord>,
    pub primary_email: EmailRecord,
}

/// Authenticated browser/device session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionToken {
    pub id: TokenId,
    pub uid: Uuid,
    /// Account email at creation time, kept with the token so telemetry
    /// eligibility checks never touch the durable store.
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub ua: UserAgentInfo,
    pub last_access_at: DateTime<Utc>,
    pub location: Option<Location>,
    /// Verification still pending; bounds the token lifetime.
    pub must_verify: bool,
}

/// Short-lived token authorizing a wrapped-key fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyFetchToken {
    pub id: TokenId,
    pub uid: Uuid,
    pub created_at: DateTime<Utc>,
    pub wrap_kb: Vec<u8>,
}

/// Token backing a forgot-password flow, with a bounded retry counter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PasswordForgotToken {
    pub id: TokenId,
    pub uid: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub pass_code: String,
    pub tries: u32,
}

/// Token authorizing a full credential reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountResetToken {
    pub id: TokenId,
    pub uid: Uuid,
    pub created_at: DateTime<Utc>,
}

/// The four token variants, stored in one tagged namespace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Token {
    Session(SessionToken),
    KeyFetch(KeyFetchToken),
    PasswordForgot(PasswordForgotToken),
    AccountReset(AccountResetToken),
}

impl Token {
    #[must_use]
    pub fn id(&self) -> &TokenId {
        match self {
            Self::Session(token) => &token.id,
            Self::KeyFetch(token) => &token.id,
            Self::PasswordForgot(token) => &token.id,
            Self::AccountReset(token) => &token.id,
        }
    }

    #[must_use]
    pub fn uid(&self) -> Uuid {
        match self {
            Self::Session(token) => token.uid,
            Self::KeyFetch(token) => token.uid,
            Self::PasswordForgot(token) => token.uid,
            Self::AccountReset(token) => token.uid,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Session(token) => token.created_at,
            Self::KeyFetch(token) => token.created_at,
            Self::PasswordForgot(token) => token.created_at,
            Self::AccountReset(token) => token.created_at,
        }
    }
}

/// Source material for minting a session token.
#[derive(Clone, Debug)]
pub struct SessionSeed {
    pub uid: Uuid,
    pub email: String,
    pub verification_pending: bool,
}

impl From<&EmailRecord> for SessionSeed {
    fn from(record: &EmailRecord) -> Self {
        Self {
            uid: record.uid,
            email: record.email.clone(),
            verification_pending: !record.is_verified,
        }
    }
}

impl From<&SessionToken> for SessionSeed {
    fn from(token: &SessionToken) -> Self {
        Self {
            uid: token.uid,
            email: token.email.clone(),
            verification_pending: token.must_verify,
        }
    }
}

/// Append-only audit record keyed by uid and IP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub uid: Uuid,
    pub name: String,
    pub ip_addr: String,
    pub token_id: Option<TokenId>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a security event; the store stamps the time.
#[derive(Clone, Debug)]
pub struct NewSecurityEvent {
    pub uid: Uuid,
    pub name: String,
    pub ip_addr: String,
    pub token_id: Option<TokenId>,
}
