//! # Gardisto (credential & session-state core)
//!
//! `gardisto` is the credential and session-state core of an account
//! service. It issues, validates, refreshes, and revokes short-lived
//! authentication tokens, tracks the devices bound to a login, and manages
//! two families of one-time-use codes.
//!
//! ## Components
//!
//! - [`tokens::TokenStore`]: account/email records and the lifecycle of the
//!   four token variants (session, key-fetch, password-forgot,
//!   account-reset). Token identifiers are unique across the whole
//!   namespace; expired tokens are indistinguishable from absent ones.
//! - [`session::SessionDirectory`]: a best-effort write-through cache that
//!   overlays last-access telemetry (time, location, user-agent) onto
//!   session tokens. The cache is the sole record of fresh telemetry;
//!   single-token lookups deliberately bypass it to keep the authentication
//!   hot path cache-free.
//! - [`devices::DeviceRegistry`]: device registration with a hard
//!   one-device-per-session-token constraint; binding a second device to a
//!   bound session is a conflict, never an overwrite.
//! - [`codes::OneTimeCodes`]: unblock codes (per-account, single active)
//!   and signin codes (globally unique among unconsumed codes), both
//!   consumed at most once.
//!
//! ## Collaborators
//!
//! The durable record store, the metadata cache, geolocation, and
//! user-agent parsing are consumed behind trait seams ([`store`], [`cache`],
//! [`geo`], [`agent`]). Cache and geolocation failures never fail the
//! enclosing operation; they degrade to stale or absent telemetry.
//!
//! ## Errors
//!
//! Every operation failure carries a stable errno ([`AuthError::errno`])
//! plus an HTTP mapping ([`AuthError::http_status`]). Token reads
//! deliberately conflate "absent" and "expired" so callers cannot probe
//! expiry timing.

pub mod agent;
pub mod cache;
pub mod codes;
pub mod config;
pub mod devices;
pub mod error;
pub mod geo;
pub mod session;
pub mod store;
pub mod tokens;

pub use crate::config::{LastAccessConfig, TokenConfig};
pub use crate::error::{AuthError, CacheError, GeoError, StoreError};
