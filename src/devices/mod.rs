//! Device Registry: endpoints bound 1:1 to session tokens.

pub mod models;
pub mod service;

pub use models::{Device, DeviceInfo, DeviceView};
pub use service::DeviceRegistry;
