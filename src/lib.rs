// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
}

// Correlation bridge: record, shared state, exchange, router, lifecycle
pub mod bridge;

// Re-exports for convenience
pub use crate::core::config::MuxDemuxConfig;
pub use crate::core::errors::{MuxDemuxError, Result};
pub use bridge::*;
