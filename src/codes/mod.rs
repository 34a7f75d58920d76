//! One-Time Code Manager: unblock codes and signin codes.

pub mod models;
pub mod service;

pub use models::{ConsumedSigninCode, SigninCode, UnblockCode};
pub use service::{CodeSource, OneTimeCodes, RandomCodes};
