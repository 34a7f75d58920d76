//! Device registry: one device per session token, telemetry-merged views.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::MetadataCache;
use crate::config::TokenConfig;
use crate::error::{AuthError, StoreError};
use crate::session::overlay::SessionOverlay;
use crate::session::service::merge_sessions;
use crate::store::RecordStore;
use crate::tokens::models::{SessionToken, Token, TokenId};
use crate::tokens::service::session_expired;

use super::models::{Device, DeviceInfo, DeviceView};

pub struct DeviceRegistry {
    store: Arc<dyn RecordStore>,
    overlay: SessionOverlay,
    config: TokenConfig,
}

impl DeviceRegistry {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn MetadataCache>,
        config: TokenConfig,
    ) -> Self {
        Self {
            store,
            overlay: SessionOverlay::new(cache),
            config,
        }
    }

    /// Bind a new device to a session token.
    ///
    /// A session token already bound to a different device is a conflict
    /// carrying that device's id, never an overwrite.
    pub async fn create_device(
        &self,
        uid: Uuid,
        session_token_id: &TokenId,
        info: DeviceInfo,
    ) -> Result<DeviceView, AuthError> {
        let session = self.owned_session(uid, session_token_id).await?;
        if let Some(existing) = self.store.device_for_session(session_token_id).await? {
            return Err(AuthError::DeviceConflict {
                device_id: existing.id,
            });
        }

        let device = Device {
            id: Uuid::new_v4(),
            uid,
            session_token_id: session_token_id.clone(),
            name: info.name.clone(),
            device_type: info
                .device_type
                .or(session.ua.device_type)
                .unwrap_or(crate::agent::DeviceType::Unknown),
            push_callback: info.push_callback.clone().filter(|v| !v.is_empty()),
            push_public_key: info.push_public_key.clone().filter(|v| !v.is_empty()),
            push_auth_key: info.push_auth_key.clone().filter(|v| !v.is_empty()),
            created_at: Utc::now(),
        };
        match self.store.insert_device(&device).await {
            Ok(()) => {}
            // Lost a race for the session binding; report the winner.
            Err(StoreError::AlreadyExists) => {
                let existing = self.store.device_for_session(session_token_id).await?;
                return Err(match existing {
                    Some(existing) => AuthError::DeviceConflict {
                        device_id: existing.id,
                    },
                    None => AuthError::UnknownDevice,
                });
            }
            Err(err) => return Err(err.into()),
        }

        Ok(view_of(device, Some(&session)))
    }

    /// Partial update of name/type/push fields. Same existence and conflict
    /// checks as registration.
    pub async fn update_device(
        &self,
        uid: Uuid,
        session_token_id: &TokenId,
        device_id: Uuid,
        info: DeviceInfo,
    ) -> Result<Device, AuthError> {
        let _session = self.owned_session(uid, session_token_id).await?;
        let mut device = self
            .store
            .device(uid, device_id)
            .await?
            .ok_or(AuthError::UnknownDevice)?;
        if let Some(bound) = self.store.device_for_session(session_token_id).await? {
            if bound.id != device.id {
                return Err(AuthError::DeviceConflict {
                    device_id: bound.id,
                });
            }
        }
        device.session_token_id = session_token_id.clone();
        device.apply(&info);
        self.store.update_device(&device).await?;
        Ok(device)
    }

    /// Remove the device row only; the bound session token is untouched.
    pub async fn delete_device(&self, uid: Uuid, device_id: Uuid) -> Result<(), AuthError> {
        if !self.store.delete_device(uid, device_id).await? {
            return Err(AuthError::UnknownDevice);
        }
        Ok(())
    }

    /// All devices for a uid, merged with their sessions' freshest telemetry
    /// (cached entries override durable rows).
    pub async fn devices(&self, uid: Uuid) -> Result<Vec<DeviceView>, AuthError> {
        let now = Utc::now();
        let devices = self.store.devices_for_uid(uid).await?;
        let rows = self.store.session_tokens_for_uid(uid).await?;
        let live: Vec<SessionToken> = rows
            .into_iter()
            .filter(|session| !session_expired(session, &self.config, now))
            .collect();
        let cached = self.overlay.load(uid).await;
        let merged = merge_sessions(live, &cached);
        let by_id: HashMap<&TokenId, &SessionToken> =
            merged.iter().map(|session| (&session.id, session)).collect();

        Ok(devices
            .into_iter()
            .map(|device| {
                let session = by_id.get(&device.session_token_id).copied();
                view_of(device, session)
            })
            .collect())
    }

    /// The session token backing a device operation, which must exist, be
    /// live, and belong to `uid`.
    async fn owned_session(
        &self,
        uid: Uuid,
        session_token_id: &TokenId,
    ) -> Result<SessionToken, AuthError> {
        let token = self.store.token(session_token_id).await?;
        let session = match token {
            Some(Token::Session(session)) if session.uid == uid => session,
            _ => return Err(AuthError::UnknownDevice),
        };
        if session_expired(&session, &self.config, Utc::now()) {
            return Err(AuthError::UnknownDevice);
        }
        Ok(session)
    }
}

fn view_of(device: Device, session: Option<&SessionToken>) -> DeviceView {
    match session {
        Some(session) => DeviceView {
            ua: session.ua.clone(),
            last_access_at: session.last_access_at,
            location: session.location.clone(),
            device,
        },
        // Dangling binding: fall back to the device row itself.
        None => DeviceView {
            ua: Default::default(),
            last_access_at: device.created_at,
            location: None,
            device,
        },
    }
}
