//! Mux/demux correlation bridge
//!
//! Many submitters push identified requests into one outbound queue, workers
//! pull and answer them through an inbound queue, and a single router files
//! each answer under its identifier so every submitter can pick up its own
//! result independently.

pub mod record;
pub mod provider;
pub mod exchange;
pub mod router;
pub mod manager;

pub use record::*;
pub use provider::*;
pub use exchange::*;
pub use router::*;
pub use manager::*;
