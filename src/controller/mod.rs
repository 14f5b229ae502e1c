//! Controller Module
//!
//! The reconciliation engine: bulk device registration, the per-record
//! mount state machine, and cascade deletion fan-outs.

pub mod cascade;
pub mod mount;
pub mod registrar;

pub use cascade::*;
pub use mount::*;
pub use registrar::*;
