//! Token Store: accounts, email rows, and the four token variants.

pub mod models;
pub mod service;

pub use service::{TokenStore, VerifyEmailOutcome};
