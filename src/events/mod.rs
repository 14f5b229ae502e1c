//! Events Module
//!
//! The incremental discovery path: udev hardware notifications, their
//! parsed representation, and the single-device watcher that folds them
//! into the record store.

pub mod device;
pub mod udevadm;
pub mod watcher;

pub use device::*;
pub use udevadm::*;
pub use watcher::*;
