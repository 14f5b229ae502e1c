//! Domain layer - collaborator port definitions
//!
//! The traits here are the seams between the reconciliation engine and the
//! external systems it drives (probe, record store, filesystem operations).

pub mod ports;

pub use ports::*;
