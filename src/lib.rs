// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod clock;
pub mod config;
pub mod cycle;
pub mod extract;
pub mod format;
pub mod ingest;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod publish;
pub mod relevance;
pub mod schedule;
pub mod select;
pub mod store;

// ---- Re-exports for the common wiring path ----
pub use crate::config::RelayConfig;
pub use crate::cycle::{CycleSummary, Relay};
pub use crate::store::StateStores;
