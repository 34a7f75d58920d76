//! In-memory record store.
//!
//! Backs tests and single-process deployments. Enforces the same uniqueness
//! constraints a relational backend would carry as indexes: uid, normalized
//! email, token id across all variants, and one device per session token.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::codes::models::{SigninCode, UnblockCode};
use crate::devices::models::Device;
use crate::error::StoreError;
use crate::tokens::models::{Account, EmailRecord, SecurityEvent, SessionToken, Token, TokenId};

use super::RecordStore;

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    emails: HashMap<String, EmailRecord>,
    tokens: HashMap<TokenId, Token>,
    devices: HashMap<Uuid, Device>,
    unblock_codes: HashMap<Uuid, UnblockCode>,
    signin_codes: HashMap<String, SigninCode>,
    security_events: Vec<SecurityEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_account(
        &self,
        account: &Account,
        primary_email: &EmailRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.accounts.contains_key(&account.uid)
            || inner.emails.contains_key(&primary_email.normalized_email)
        {
            return Err(StoreError::AlreadyExists);
        }
        inner.accounts.insert(account.uid, account.clone());
        inner.emails.insert(
            primary_email.normalized_email.clone(),
            primary_email.clone(),
        );
        Ok(())
    }

    async fn account(&self, uid: Uuid) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.get(&uid).cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.accounts.get_mut(&account.uid) {
            Some(slot) => {
                *slot = account.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_account(&self, uid: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.accounts.remove(&uid).is_none() {
            return Ok(false);
        }
        inner.emails.retain(|_, record| record.uid != uid);
        inner.tokens.retain(|_, token| token.uid() != uid);
        inner.devices.retain(|_, device| device.uid != uid);
        inner.unblock_codes.remove(&uid);
        inner.signin_codes.retain(|_, code| code.uid != uid);
        Ok(true)
    }

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.emails.contains_key(&record.normalized_email) {
            return Err(StoreError::AlreadyExists);
        }
        inner
            .emails
            .insert(record.normalized_email.clone(), record.clone());
        Ok(())
    }

    async fn email_by_normalized(
        &self,
        normalized: &str,
    ) -> Result<Option<EmailRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.emails.get(normalized).cloned())
    }

    async fn emails_for_uid(&self, uid: Uuid) -> Result<Vec<EmailRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<EmailRecord> = inner
            .emails
            .values()
            .filter(|record| record.uid == uid)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.normalized_email.cmp(&b.normalized_email))
        });
        Ok(records)
    }

    async fn update_email(&self, record: &EmailRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.emails.get_mut(&record.normalized_email) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_email(&self, uid: Uuid, normalized: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .emails
            .get(normalized)
            .is_some_and(|record| record.uid == uid);
        if owned {
            inner.emails.remove(normalized);
        }
        Ok(owned)
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.tokens.contains_key(token.id()) {
            return Err(StoreError::AlreadyExists);
        }
        inner.tokens.insert(token.id().clone(), token.clone());
        Ok(())
    }

    async fn token(&self, id: &TokenId) -> Result<Option<Token>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tokens.get(id).cloned())
    }

    async fn update_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.tokens.get_mut(token.id()) {
            Some(slot) => {
                *slot = token.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_token(&self, id: &TokenId) -> Result<Option<Token>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.tokens.remove(id))
    }

    async fn session_tokens_for_uid(&self, uid: Uuid) -> Result<Vec<SessionToken>, StoreError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<SessionToken> = inner
            .tokens
            .values()
            .filter_map(|token| match token {
                Token::Session(session) if session.uid == uid => Some(session.clone()),
                _ => None,
            })
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(sessions)
    }

    async fn delete_tokens_for_uid(&self, uid: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.tokens.retain(|_, token| token.uid() != uid);
        Ok(())
    }

    async fn insert_device(&self, device: &Device) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let session_taken = inner
            .devices
            .values()
            .any(|existing| existing.session_token_id == device.session_token_id);
        if session_taken || inner.devices.contains_key(&device.id) {
            return Err(StoreError::AlreadyExists);
        }
        inner.devices.insert(device.id, device.clone());
        Ok(())
    }

    async fn device(&self, uid: Uuid, device_id: Uuid) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .devices
            .get(&device_id)
            .filter(|device| device.uid == uid)
            .cloned())
    }

    async fn device_for_session(
        &self,
        session_token_id: &TokenId,
    ) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .devices
            .values()
            .find(|device| &device.session_token_id == session_token_id)
            .cloned())
    }

    async fn devices_for_uid(&self, uid: Uuid) -> Result<Vec<Device>, StoreError> {
        let inner = self.inner.read().await;
        let mut devices: Vec<Device> = inner
            .devices
            .values()
            .filter(|device| device.uid == uid)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(devices)
    }

    async fn update_device(&self, device: &Device) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.devices.get_mut(&device.id) {
            Some(slot) => {
                *slot = device.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_device(&self, uid: Uuid, device_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .devices
            .get(&device_id)
            .is_some_and(|device| device.uid == uid);
        if owned {
            inner.devices.remove(&device_id);
        }
        Ok(owned)
    }

    async fn delete_device_for_session(
        &self,
        session_token_id: &TokenId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .devices
            .retain(|_, device| &device.session_token_id != session_token_id);
        Ok(())
    }

    async fn delete_devices_for_uid(&self, uid: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.devices.retain(|_, device| device.uid != uid);
        Ok(())
    }

    async fn put_unblock_code(&self, code: &UnblockCode) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.unblock_codes.insert(code.uid, code.clone());
        Ok(())
    }

    async fn unblock_code(&self, uid: Uuid) -> Result<Option<UnblockCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.unblock_codes.get(&uid).cloned())
    }

    async fn delete_unblock_code(&self, uid: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.unblock_codes.remove(&uid).is_some())
    }

    async fn insert_signin_code(&self, code: &SigninCode) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.signin_codes.contains_key(&code.code) {
            return Err(StoreError::AlreadyExists);
        }
        inner.signin_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn signin_code(&self, code: &str) -> Result<Option<SigninCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.signin_codes.get(code).cloned())
    }

    async fn take_signin_code(&self, code: &str) -> Result<Option<SigninCode>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.signin_codes.remove(code))
    }

    async fn append_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.security_events.push(event.clone());
        Ok(())
    }

    async fn security_events(&self, uid: Uuid) -> Result<Vec<SecurityEvent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .security_events
            .iter()
            .filter(|event| event.uid == uid)
            .cloned()
            .collect())
    }
}
