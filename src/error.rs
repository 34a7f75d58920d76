//! Error taxonomy for the credential core.
//!
//! Operation failures carry a stable numeric code (`errno`) alongside the
//! human-readable message, so the route layer can map them onto wire
//! responses without matching on variants. Cache and geolocation failures
//! never appear here: they are absorbed inside the session component.

use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by [`RecordStore`](crate::store::RecordStore) backends.
///
/// Anything that is not a uniqueness or existence signal propagates
/// unchanged as [`StoreError::Backend`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,
    #[error("record not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failures from the [`MetadataCache`](crate::cache::MetadataCache) seam.
#[derive(Debug, Error)]
#[error("metadata cache unavailable: {0}")]
pub struct CacheError(pub String);

/// Failures from the [`GeoResolver`](crate::geo::GeoResolver) seam.
#[derive(Debug, Error)]
#[error("geolocation lookup failed: {0}")]
pub struct GeoError(pub String);

/// Errors exposed to the route layer.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Duplicate account or email at creation time.
    #[error("Account already exists")]
    AccountExists,
    /// No account matches the supplied uid or email.
    #[error("Unknown account")]
    AccountNotFound,
    /// The token is absent or expired. The two cases are deliberately
    /// indistinguishable so callers cannot probe expiry timing.
    #[error("The authentication token could not be found")]
    InvalidToken,
    /// The device does not exist, or the session token backing a device
    /// operation is absent or owned by another account.
    #[error("Unknown device")]
    UnknownDevice,
    /// The session token is already bound to another device.
    #[error("Session already registered by another device")]
    DeviceConflict { device_id: Uuid },
    #[error("Invalid unblock code")]
    InvalidUnblockCode,
    #[error("Invalid signin code")]
    InvalidSigninCode,
    /// A secondary-email operation attempted to remove a primary email.
    #[error("Can not delete primary email")]
    PrimaryEmailDeletion,
    /// Durable-store failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Anything without a dedicated code, e.g. entropy-source failure.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AuthError {
    /// Stable numeric code for wire responses.
    #[must_use]
    pub fn errno(&self) -> u16 {
        match self {
            Self::AccountExists => 101,
            Self::AccountNotFound => 102,
            Self::InvalidToken => 110,
            Self::UnknownDevice => 123,
            Self::DeviceConflict { .. } => 124,
            Self::InvalidUnblockCode => 127,
            Self::PrimaryEmailDeletion => 137,
            Self::InvalidSigninCode => 146,
            Self::Store(_) | Self::Unexpected(_) => 999,
        }
    }

    /// HTTP status the route layer should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AccountExists => 409,
            Self::InvalidToken => 401,
            Self::Store(_) | Self::Unexpected(_) => 500,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, StoreError};
    use uuid::Uuid;

    #[test]
    fn errno_values_are_stable() {
        assert_eq!(AuthError::AccountExists.errno(), 101);
        assert_eq!(AuthError::AccountNotFound.errno(), 102);
        assert_eq!(AuthError::InvalidToken.errno(), 110);
        assert_eq!(AuthError::UnknownDevice.errno(), 123);
        assert_eq!(
            AuthError::DeviceConflict {
                device_id: Uuid::nil()
            }
            .errno(),
            124
        );
        assert_eq!(AuthError::InvalidUnblockCode.errno(), 127);
        assert_eq!(AuthError::InvalidSigninCode.errno(), 146);
    }

    #[test]
    fn http_status_maps_taxonomy() {
        assert_eq!(AuthError::AccountExists.http_status(), 409);
        assert_eq!(AuthError::InvalidToken.http_status(), 401);
        assert_eq!(AuthError::InvalidSigninCode.http_status(), 400);
        assert_eq!(
            AuthError::Store(StoreError::Backend("down".to_string())).http_status(),
            500
        );
    }

    #[test]
    fn store_error_passes_through() {
        let err = AuthError::from(StoreError::Backend("connection refused".to_string()));
        assert_eq!(err.errno(), 999);
        assert_eq!(err.to_string(), "storage backend error: connection refused");
    }
}
