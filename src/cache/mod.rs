//! Metadata cache seam.
//!
//! A plain key-value interface over whatever fast store backs session
//! telemetry. Failures are non-fatal by contract: callers log and degrade to
//! stale or absent telemetry.

use async_trait::async_trait;

use crate::error::CacheError;

pub mod memory;

pub use memory::MemoryCache;

#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
