//! Udev device attributes
//!
//! A hardware notification arrives as a flat map of udev environment
//! properties. This module names the keys the agent cares about and wraps
//! the map with typed accessors.

use std::collections::BTreeMap;

// =============================================================================
// Udev property keys
// =============================================================================

/// Kernel-assigned device node, e.g. /dev/sdb
pub const UDEV_DEVNAME: &str = "DEVNAME";
/// Device type as udev classifies it (disk or partition)
pub const UDEV_ID_TYPE: &str = "ID_TYPE";
/// Bus path of the device
pub const UDEV_ID_PATH: &str = "ID_PATH";
/// Filesystem type present on the device, if any
pub const UDEV_FS_TYPE: &str = "ID_FS_TYPE";
/// Subsystem the event belongs to
pub const UDEV_SUBSYSTEM: &str = "SUBSYSTEM";
/// Action property carried by monitor output
pub const UDEV_ACTION: &str = "ACTION";

const ID_TYPE_DISK: &str = "disk";
const ID_TYPE_PARTITION: &str = "partition";
const SUBSYSTEM_BLOCK: &str = "block";

// =============================================================================
// Event Types
// =============================================================================

/// Hardware notification action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Device appeared
    Add,
    /// Device disappeared
    Remove,
}

impl EventAction {
    /// Parse a udev ACTION value; actions the agent does not handle
    /// (change, bind, ...) yield None.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "add" => Some(EventAction::Add),
            "remove" => Some(EventAction::Remove),
            _ => None,
        }
    }
}

/// One hardware notification: an action plus the udev property map
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub action: EventAction,
    pub attributes: DeviceAttributes,
}

/// Udev environment property map with typed accessors
#[derive(Debug, Clone, Default)]
pub struct DeviceAttributes(BTreeMap<String, String>);

impl DeviceAttributes {
    /// Wrap a raw property map
    pub fn new(env: BTreeMap<String, String>) -> Self {
        Self(env)
    }

    /// Raw property lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the event belongs to the block subsystem
    pub fn is_block(&self) -> bool {
        self.get(UDEV_SUBSYSTEM) == Some(SUBSYSTEM_BLOCK)
    }

    /// Whether the device is a whole disk
    pub fn is_disk(&self) -> bool {
        self.get(UDEV_ID_TYPE) == Some(ID_TYPE_DISK)
    }

    /// Whether the device is a partition
    pub fn is_partition(&self) -> bool {
        self.get(UDEV_ID_TYPE) == Some(ID_TYPE_PARTITION)
    }

    /// The /dev path of the device
    pub fn dev_path(&self) -> &str {
        self.get(UDEV_DEVNAME).unwrap_or_default()
    }

    /// Short device name derived from the /dev path, e.g. sdb
    pub fn short_name(&self) -> &str {
        self.dev_path().trim_start_matches("/dev/")
    }

    /// The bus path udev reports for the device
    pub fn id_path(&self) -> &str {
        self.get(UDEV_ID_PATH).unwrap_or_default()
    }
}
