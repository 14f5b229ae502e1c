//! BlockDevice CRD
//!
//! The published representation of one physical disk or one partition on a
//! node. The spec carries declared intent (device path, filesystem/mount
//! wishes); the status carries everything the agent observed about the
//! device during the last probe.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Labels & Condition Types
// =============================================================================

/// Label linking a partition record to its parent disk record (by name).
pub const PARENT_DEVICE_LABEL: &str = "blockdevice.longhorn.io/parent-device";

/// Standard hostname label; every record carries the owning node's name.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Condition type tracking whether the device is mounted where its spec asks.
pub const CONDITION_MOUNTED: &str = "Mounted";

// =============================================================================
// BlockDevice CRD
// =============================================================================

/// BlockDevice tracks one block device (disk or partition) discovered on a
/// node. Records are created and updated by the node agent; only the
/// filesystem intent in the spec is meant to be edited by users.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "longhorn.io",
    version = "v1beta1",
    kind = "BlockDevice",
    plural = "blockdevices",
    shortname = "bd",
    status = "BlockDeviceStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".spec.nodeName"}"#,
    printcolumn = r#"{"name": "Path", "type": "string", "jsonPath": ".spec.devPath"}"#,
    printcolumn = r#"{"name": "Type", "type": "string", "jsonPath": ".status.deviceStatus.details.deviceType"}"#,
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceSpec {
    /// Name of the node this device is attached to
    pub node_name: String,

    /// Device path, e.g. /dev/sdb1
    pub dev_path: String,

    /// Declared filesystem intent for this device
    #[serde(default)]
    pub file_system: FilesystemInfo,
}

/// Declared filesystem intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemInfo {
    /// Desired filesystem type
    #[serde(default)]
    pub fs_type: String,

    /// Where the device should be mounted; empty means no mount intent
    #[serde(default)]
    pub mount_point: String,

    /// Format the device before mounting if the observed filesystem does
    /// not match the intent. Honored at most once per record.
    #[serde(default)]
    pub force_formatted: bool,
}

// =============================================================================
// Status
// =============================================================================

/// Status of the BlockDevice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDeviceStatus {
    /// Attachment state of the device
    #[serde(default)]
    pub state: BlockDeviceState,

    /// Everything observed about the device hardware
    #[serde(default)]
    pub device_status: DeviceStatus,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Attachment state of a block device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BlockDeviceState {
    /// The device is present on the node
    #[default]
    Active,
    /// The device was unplugged; the record is kept for re-attachment
    Detached,
}

impl std::fmt::Display for BlockDeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockDeviceState::Active => write!(f, "Active"),
            BlockDeviceState::Detached => write!(f, "Detached"),
        }
    }
}

/// Observed hardware state of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// True iff the disk had at least one partition at last scan
    #[serde(default)]
    pub partitioned: bool,

    /// Device capacity
    #[serde(default)]
    pub capacity: DeviceCapacity,

    /// Hardware identity details
    #[serde(default)]
    pub details: DeviceDetails,

    /// Observed filesystem on the device
    #[serde(default)]
    pub file_system: FilesystemStatus,

    /// Device path of the parent disk; set on partition records only
    #[serde(default)]
    pub parent_device: String,
}

/// Device capacity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapacity {
    /// Size in bytes
    #[serde(default)]
    pub size_bytes: u64,

    /// Physical block size in bytes
    #[serde(default)]
    pub physical_block_size_bytes: u64,
}

/// Classification of a device record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// A whole disk
    #[default]
    Disk,
    /// A partition of a disk
    Part,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Disk => write!(f, "disk"),
            DeviceType::Part => write!(f, "part"),
        }
    }
}

/// Hardware identity details copied verbatim from the probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    /// Whether this record is a disk or a partition
    #[serde(default)]
    pub device_type: DeviceType,

    /// Drive type reported by the probe (hdd, ssd, virtual, ...)
    #[serde(default)]
    pub drive_type: String,

    /// Whether the device is removable
    #[serde(default)]
    pub is_removable: bool,

    /// Storage controller kind (scsi, nvme, virtio, ...)
    #[serde(default)]
    pub storage_controller: String,

    /// Device UUID
    #[serde(default)]
    pub uuid: String,

    /// Partition table UUID
    #[serde(default)]
    pub pt_uuid: String,

    /// Bus path of the device
    #[serde(default)]
    pub bus_path: String,

    /// Device model
    #[serde(default)]
    pub model: String,

    /// Device vendor
    #[serde(default)]
    pub vendor: String,

    /// Serial number
    #[serde(default)]
    pub serial_number: String,

    /// NUMA node the device is attached to; -1 when unknown
    #[serde(default)]
    pub numa_node_id: i32,

    /// World Wide Name
    #[serde(default)]
    pub wwn: String,

    /// Filesystem label; partitions only
    #[serde(default)]
    pub label: String,

    /// Partition UUID; partitions only
    #[serde(default)]
    pub part_uuid: String,
}

/// Observed filesystem state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemStatus {
    /// Observed filesystem type
    #[serde(default, rename = "type")]
    pub fs_type: String,

    /// Observed mount point; empty when not mounted
    #[serde(default)]
    pub mount_point: String,

    /// Whether the filesystem is mounted read-only
    #[serde(default)]
    pub is_read_only: bool,

    /// When the agent last formatted this device; unset means never
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_formatted_at: Option<DateTime<Utc>>,
}

/// Observed condition attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status: True or False
    pub status: bool,
    /// Last time the status flipped
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Message
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Implementations
// =============================================================================

impl BlockDevice {
    /// Check whether this record represents a partition
    pub fn is_partition(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.device_status.details.device_type == DeviceType::Part)
            .unwrap_or(false)
    }

    /// Get the current Mounted condition, if set
    pub fn mounted_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.r#type == CONDITION_MOUNTED))
    }

    /// Set the Mounted condition, upserting by type
    pub fn set_mounted_condition(&mut self, mounted: bool, reason: &str, message: &str) {
        let status = self.status.get_or_insert_with(BlockDeviceStatus::default);
        status.set_condition(CONDITION_MOUNTED, mounted, reason, message);
    }
}

impl BlockDeviceStatus {
    /// Upsert a condition by type. The transition time is only restamped
    /// when the boolean status actually flips, so identical evaluations
    /// produce identical records.
    pub fn set_condition(&mut self, r#type: &str, value: bool, reason: &str, message: &str) {
        let reason = (!reason.is_empty()).then(|| reason.to_string());
        let message = (!message.is_empty()).then(|| message.to_string());

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.r#type == r#type) {
            if existing.status != value {
                existing.last_transition_time = Some(Utc::now());
            }
            existing.status = value;
            existing.reason = reason;
            existing.message = message;
        } else {
            self.conditions.push(Condition {
                r#type: r#type.to_string(),
                status: value,
                last_transition_time: Some(Utc::now()),
                reason,
                message,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_upserts_by_type() {
        let mut status = BlockDeviceStatus::default();
        status.set_condition(CONDITION_MOUNTED, true, "", "");
        status.set_condition(CONDITION_MOUNTED, false, "MountFailed", "device busy");

        assert_eq!(status.conditions.len(), 1);
        let cond = &status.conditions[0];
        assert!(!cond.status);
        assert_eq!(cond.reason.as_deref(), Some("MountFailed"));
        assert_eq!(cond.message.as_deref(), Some("device busy"));
    }

    #[test]
    fn test_condition_transition_time_stable_when_status_unchanged() {
        let mut status = BlockDeviceStatus::default();
        status.set_condition(CONDITION_MOUNTED, true, "", "");
        let first = status.conditions[0].last_transition_time;

        status.set_condition(CONDITION_MOUNTED, true, "", "");
        assert_eq!(status.conditions[0].last_transition_time, first);
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Disk), "disk");
        assert_eq!(format!("{}", DeviceType::Part), "part");
        assert_eq!(format!("{}", BlockDeviceState::Detached), "Detached");
    }
}
