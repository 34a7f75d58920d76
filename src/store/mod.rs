//! Durable record store seam.
//!
//! The relational backend is a collaborator: the core only requires CRUD per
//! entity, lookup by primary and secondary unique keys, and cascade-aware
//! account deletion. Per-row writes are atomic; nothing here assumes
//! cross-row transactions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::codes::models::{SigninCode, UnblockCode};
use crate::devices::models::Device;
use crate::error::StoreError;
use crate::tokens::models::{Account, EmailRecord, SecurityEvent, SessionToken, Token, TokenId};

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new account with its initial (primary) email row.
    /// Fails with [`StoreError::AlreadyExists`] if the uid or the normalized
    /// email is taken.
    async fn insert_account(
        &self,
        account: &Account,
        primary_email: &EmailRecord,
    ) -> Result<(), StoreError>;
    async fn account(&self, uid: Uuid) -> Result<Option<Account>, StoreError>;
    async fn update_account(&self, account: &Account) -> Result<(), StoreError>;
    /// Cascade delete: emails, tokens, devices, and one-time codes go with
    /// the account. Returns whether the account existed.
    async fn delete_account(&self, uid: Uuid) -> Result<bool, StoreError>;

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StoreError>;
    async fn email_by_normalized(
        &self,
        normalized: &str,
    ) -> Result<Option<EmailRecord>, StoreError>;
    async fn emails_for_uid(&self, uid: Uuid) -> Result<Vec<EmailRecord>, StoreError>;
    async fn update_email(&self, record: &EmailRecord) -> Result<(), StoreError>;
    async fn delete_email(&self, uid: Uuid, normalized: &str) -> Result<bool, StoreError>;

    /// Insert into the shared token namespace; the identifier must be unique
    /// across all four variants.
    async fn insert_token(&self, token: &Token) -> Result<(), StoreError>;
    async fn token(&self, id: &TokenId) -> Result<Option<Token>, StoreError>;
    async fn update_token(&self, token: &Token) -> Result<(), StoreError>;
    async fn delete_token(&self, id: &TokenId) -> Result<Option<Token>, StoreError>;
    async fn session_tokens_for_uid(&self, uid: Uuid) -> Result<Vec<SessionToken>, StoreError>;
    async fn delete_tokens_for_uid(&self, uid: Uuid) -> Result<(), StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if the session token is
    /// already bound to a device (the backstop for the 1:1 invariant).
    async fn insert_device(&self, device: &Device) -> Result<(), StoreError>;
    async fn device(&self, uid: Uuid, device_id: Uuid) -> Result<Option<Device>, StoreError>;
    async fn device_for_session(
        &self,
        session_token_id: &TokenId,
    ) -> Result<Option<Device>, StoreError>;
    async fn devices_for_uid(&self, uid: Uuid) -> Result<Vec<Device>, StoreError>;
    async fn update_device(&self, device: &Device) -> Result<(), StoreError>;
    async fn delete_device(&self, uid: Uuid, device_id: Uuid) -> Result<bool, StoreError>;
    async fn delete_device_for_session(
        &self,
        session_token_id: &TokenId,
    ) -> Result<(), StoreError>;
    async fn delete_devices_for_uid(&self, uid: Uuid) -> Result<(), StoreError>;

    /// Upsert: at most one unblock code per uid.
    async fn put_unblock_code(&self, code: &UnblockCode) -> Result<(), StoreError>;
    async fn unblock_code(&self, uid: Uuid) -> Result<Option<UnblockCode>, StoreError>;
    async fn delete_unblock_code(&self, uid: Uuid) -> Result<bool, StoreError>;

    async fn insert_signin_code(&self, code: &SigninCode) -> Result<(), StoreError>;
    async fn signin_code(&self, code: &str) -> Result<Option<SigninCode>, StoreError>;
    /// Destructive read: removes and returns the row in one step.
    async fn take_signin_code(&self, code: &str) -> Result<Option<SigninCode>, StoreError>;

    async fn append_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError>;
    async fn security_events(&self, uid: Uuid) -> Result<Vec<SecurityEvent>, StoreError>;
}
