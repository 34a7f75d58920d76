//! Geolocation resolver seam.
//!
//! Lookups are best-effort: callers swallow failures and proceed without a
//! location rather than delaying the authentication path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Coarse location attached to session telemetry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub time_zone: Option<String>,
}

#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> Result<Location, GeoError>;
}

/// Resolver used when no geolocation backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopGeoResolver;

#[async_trait]
impl GeoResolver for NoopGeoResolver {
    async fn resolve(&self, _ip: &str) -> Result<Location, GeoError> {
        Err(GeoError("geolocation is not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoResolver, NoopGeoResolver};

    #[tokio::test]
    async fn noop_resolver_always_fails() {
        let resolver = NoopGeoResolver;
        assert!(resolver.resolve("203.0.113.1").await.is_err());
    }
}
