// src/config/mod.rs
pub mod relay;

pub use relay::{normalize_channel_id, RelayConfig};
