//! Topology Module
//!
//! Derives the canonical disk/partition record tree from a hardware probe
//! and the deterministic record names everything else looks devices up by.

pub mod builder;
pub mod naming;

pub use builder::*;
pub use naming::*;
