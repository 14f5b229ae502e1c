//! Custom Resource Definitions for the node disk agent
//!
//! - BlockDevice: one record per discovered disk or partition
//! - Node: node participation, consumed only as a deletion-event source

pub mod block_device;
pub mod node;

pub use block_device::*;
pub use node::*;
