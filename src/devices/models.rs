//! Device records and views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{DeviceType, UserAgentInfo};
use crate::geo::Location;
use crate::tokens::models::TokenId;

/// Durable device row, bound 1:1 to a session token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub uid: Uuid,
    pub session_token_id: TokenId,
    pub name: Option<String>,
    pub device_type: DeviceType,
    pub push_callback: Option<String>,
    pub push_public_key: Option<String>,
    pub push_auth_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Partial update: present fields replace stored values; empty push
    /// values clear the subscription field.
    pub(crate) fn apply(&mut self, info: &DeviceInfo) {
        if let Some(name) = &info.name {
            self.name = Some(name.clone());
        }
        if let Some(device_type) = info.device_type {
            self.device_type = device_type;
        }
        if let Some(value) = &info.push_callback {
            self.push_callback = clearable(value);
        }
        if let Some(value) = &info.push_public_key {
            self.push_public_key = clearable(value);
        }
        if let Some(value) = &info.push_auth_key {
            self.push_auth_key = clearable(value);
        }
    }
}

fn clearable(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Caller-supplied device fields for registration and updates.
#[derive(Clone, Debug, Default)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub device_type: Option<DeviceType>,
    pub push_callback: Option<String>,
    pub push_public_key: Option<String>,
    pub push_auth_key: Option<String>,
}

impl DeviceInfo {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Device merged with its bound session's current telemetry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceView {
    pub device: Device,
    pub ua: UserAgentInfo,
    pub last_access_at: DateTime<Utc>,
    pub location: Option<Location>,
}
