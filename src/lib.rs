//! Node Disk Agent - Block Device Reconciliation Engine
//!
//! A per-node Kubernetes agent that keeps BlockDevice custom resources in
//! sync with the node's physical block storage. On startup it probes every
//! disk and partition, materializes one record per device, and then keeps
//! the records current from udev events and change notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Node Disk Agent                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌────────────────┐  ┌─────────────────────┐  │
//! │  │  Sysfs Probe  │  │  Udev Monitor  │  │  Change Notifier    │  │
//! │  │  (full scan)  │  │  (add/remove)  │  │  (kube watcher)     │  │
//! │  └───────┬───────┘  └───────┬────────┘  └──────────┬──────────┘  │
//! │          │                  │                      │             │
//! │  ┌───────┴───────┐  ┌───────┴────────┐  ┌──────────┴──────────┐  │
//! │  │   Registrar   │  │  Event Watcher │  │  Mount Reconciler   │  │
//! │  │  (bulk sync)  │  │  (incremental) │  │  Cascade Deleter    │  │
//! │  └───────┬───────┘  └───────┬────────┘  └──────────┬──────────┘  │
//! │          └──────────────────┼──────────────────────┘             │
//! │                     ┌───────┴────────┐                           │
//! │                     │  Device Store  │                           │
//! │                     │  (BlockDevice  │                           │
//! │                     │      CRs)      │                           │
//! │                     └────────────────┘                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`topology`]: device naming and record construction from probe data
//! - [`controller`]: registrar, mount state machine, cascade deletion
//! - [`events`]: udev event parsing, incremental watcher, udevadm source
//! - [`hardware`]: sysfs probe and mkfs/mount adapters
//! - [`store`]: BlockDevice persistence (Kubernetes and in-memory)
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: core domain types and traits
//! - [`error`]: error types and handling

pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod events;
pub mod hardware;
pub mod store;
pub mod topology;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use controller::{CascadeDeleter, DeviceRegistrar, MountReconciler, SaveOutcome};

pub use crd::{
    BlockDevice, BlockDeviceSpec, BlockDeviceState, BlockDeviceStatus, Condition, DeviceType,
    FilesystemInfo, FilesystemStatus, HOSTNAME_LABEL, PARENT_DEVICE_LABEL,
};

pub use domain::ports::{
    ControllerKind, DeviceStore, DiskProbe, DriveKind, FilesystemOps, FilesystemProbe,
    HardwareProbe, PartitionProbe,
};

pub use error::{Error, ErrorAction, Result};

pub use events::{DeviceEvent, DeviceEventWatcher, EventAction, UdevadmMonitor, WatcherConfig};

pub use hardware::{ProbeConfig, SysfsProbe, SystemFilesystemOps};

pub use store::{KubeDeviceStore, MemoryDeviceStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
