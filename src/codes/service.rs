//! One-time codes: unblock codes and signin codes.

use std::sync::Arc;

use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::{AuthError, StoreError};
use crate::store::RecordStore;
use crate::tokens::service::expired_after;

use super::models::{ConsumedSigninCode, SigninCode, UnblockCode};

pub const UNBLOCK_CODE_LEN: usize = 8;
pub const SIGNIN_CODE_BYTES: usize = 8;

// Confusion-resistant alphabet: no I, L, O, U.
const UNBLOCK_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const MAX_CODE_ATTEMPTS: usize = 10;

/// Raw material for one-time codes. A seam so collision handling stays
/// testable against a scripted source.
pub trait CodeSource: Send + Sync {
    fn unblock_code(&self) -> Result<String, AuthError>;
    fn signin_code(&self) -> Result<[u8; SIGNIN_CODE_BYTES], AuthError>;
}

/// OS-entropy code source used in production.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn unblock_code(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; UNBLOCK_CODE_LEN];
        fill_random(&mut bytes)?;
        Ok(bytes
            .iter()
            .map(|byte| UNBLOCK_ALPHABET[*byte as usize % UNBLOCK_ALPHABET.len()] as char)
            .collect())
    }

    fn signin_code(&self) -> Result<[u8; SIGNIN_CODE_BYTES], AuthError> {
        let mut bytes = [0u8; SIGNIN_CODE_BYTES];
        fill_random(&mut bytes)?;
        Ok(bytes)
    }
}

fn fill_random(bytes: &mut [u8]) -> Result<(), AuthError> {
    OsRng
        .try_fill_bytes(bytes)
        .map_err(|err| AuthError::Unexpected(format!("entropy source failed: {err}")))
}

pub struct OneTimeCodes {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn CodeSource>,
    config: TokenConfig,
}

impl OneTimeCodes {
    pub fn new(
        store: Arc<dyn RecordStore>,
        source: Arc<dyn CodeSource>,
        config: TokenConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Issue a fresh unblock code, replacing any outstanding one for the
    /// account.
    pub async fn create_unblock_code(&self, uid: Uuid) -> Result<String, AuthError> {
        let code = self.source.unblock_code()?;
        let row = UnblockCode {
            uid,
            code: code.clone(),
            created_at: Utc::now(),
        };
        self.store.put_unblock_code(&row).await?;
        Ok(code)
    }

    /// One-shot consumption. The stored row is deleted on success, so a
    /// replay of the same code fails exactly like a wrong one.
    pub async fn consume_unblock_code(
        &self,
        uid: Uuid,
        code: &str,
    ) -> Result<chrono::DateTime<Utc>, AuthError> {
        let supplied = normalize_unblock_code(code);
        let row = self
            .store
            .unblock_code(uid)
            .await?
            .ok_or(AuthError::InvalidUnblockCode)?;
        if row.code != supplied {
            return Err(AuthError::InvalidUnblockCode);
        }
        let ttl = self.config.unblock_code_ttl_seconds();
        if expired_after(row.created_at, Some(ttl), Utc::now()) {
            return Err(AuthError::InvalidUnblockCode);
        }
        self.store.delete_unblock_code(uid).await?;
        Ok(row.created_at)
    }

    /// Mint a signin code, regenerating on collision with any unconsumed
    /// code so a duplicate row can never appear.
    pub async fn create_signin_code(
        &self,
        uid: Uuid,
        flow_id: Option<String>,
    ) -> Result<String, AuthError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = hex::encode(self.source.signin_code()?);
            if self.store.signin_code(&code).await?.is_some() {
                continue;
            }
            let row = SigninCode {
                code: code.clone(),
                uid,
                flow_id: flow_id.clone(),
                created_at: Utc::now(),
            };
            match self.store.insert_signin_code(&row).await {
                Ok(()) => return Ok(code),
                // Raced another writer to the same value; try again.
                Err(StoreError::AlreadyExists) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(AuthError::Unexpected(
            "failed to generate a unique signin code".to_string(),
        ))
    }

    /// Destructive consumption: returns the owning account's email and the
    /// flow id. Absent, expired, and already-consumed codes all answer with
    /// the same error.
    pub async fn consume_signin_code(&self, code: &str) -> Result<ConsumedSigninCode, AuthError> {
        let normalized = code.trim().to_lowercase();
        let row = self
            .store
            .take_signin_code(&normalized)
            .await?
            .ok_or(AuthError::InvalidSigninCode)?;
        let ttl = self.config.signin_code_ttl_seconds();
        if expired_after(row.created_at, Some(ttl), Utc::now()) {
            return Err(AuthError::InvalidSigninCode);
        }
        let email = self
            .store
            .emails_for_uid(row.uid)
            .await?
            .into_iter()
            .find(|record| record.is_primary)
            .map(|record| record.email)
            .ok_or(AuthError::InvalidSigninCode)?;
        Ok(ConsumedSigninCode {
            uid: row.uid,
            email,
            flow_id: row.flow_id,
        })
    }
}

/// Case/format normalization: uppercase, with separators stripped.
fn normalize_unblock_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
