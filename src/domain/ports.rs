//! Domain Ports - trait definitions for the agent's collaborators
//!
//! These traits define the boundaries between the reconciliation engine and
//! external systems: the hardware probe, the record store, and the actual
//! filesystem operations. Adapters implement them; the engine only decides
//! when they run and what state results.

use crate::crd::BlockDevice;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Probe Types
// =============================================================================

/// Drive type reported by the hardware probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveKind {
    Hdd,
    Ssd,
    Virtual,
    #[default]
    Unknown,
}

impl std::fmt::Display for DriveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveKind::Hdd => write!(f, "HDD"),
            DriveKind::Ssd => write!(f, "SSD"),
            DriveKind::Virtual => write!(f, "Virtual"),
            DriveKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Storage controller kind reported by the hardware probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    Scsi,
    Ide,
    Nvme,
    Virtio,
    Mmc,
    Loop,
    #[default]
    Unknown,
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerKind::Scsi => write!(f, "SCSI"),
            ControllerKind::Ide => write!(f, "IDE"),
            ControllerKind::Nvme => write!(f, "NVMe"),
            ControllerKind::Virtio => write!(f, "virtio"),
            ControllerKind::Mmc => write!(f, "MMC"),
            ControllerKind::Loop => write!(f, "loop"),
            ControllerKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Observed filesystem on a probed device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemProbe {
    /// Filesystem type, empty when none detected
    #[serde(default)]
    pub fs_type: String,
    /// Current mount point, empty when unmounted
    #[serde(default)]
    pub mount_point: String,
    /// Whether mounted read-only
    #[serde(default)]
    pub is_read_only: bool,
}

/// One probed partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionProbe {
    /// Short device name, e.g. sdb1
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size_bytes: u64,
    /// Filesystem label
    #[serde(default)]
    pub label: String,
    /// Partition UUID
    #[serde(default)]
    pub uuid: String,
    /// Observed filesystem
    #[serde(default)]
    pub file_system: FilesystemProbe,
}

/// One probed disk with its partitions, in probe order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskProbe {
    /// Short device name, e.g. sdb
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size_bytes: u64,
    /// Physical block size in bytes
    #[serde(default)]
    pub physical_block_size_bytes: u64,
    /// Bus path of the device
    #[serde(default)]
    pub bus_path: String,
    /// Drive type
    #[serde(default)]
    pub drive_type: DriveKind,
    /// Whether the device is removable
    #[serde(default)]
    pub is_removable: bool,
    /// Storage controller kind
    #[serde(default)]
    pub storage_controller: ControllerKind,
    /// Device UUID
    #[serde(default)]
    pub uuid: String,
    /// Partition table UUID
    #[serde(default)]
    pub pt_uuid: String,
    /// Device model
    #[serde(default)]
    pub model: String,
    /// Device vendor
    #[serde(default)]
    pub vendor: String,
    /// Serial number
    #[serde(default)]
    pub serial_number: String,
    /// NUMA node; -1 when unknown
    #[serde(default)]
    pub numa_node_id: i32,
    /// World Wide Name
    #[serde(default)]
    pub wwn: String,
    /// Observed filesystem on the whole disk
    #[serde(default)]
    pub file_system: FilesystemProbe,
    /// Partitions in probe order
    #[serde(default)]
    pub partitions: Vec<PartitionProbe>,
}

// =============================================================================
// Ports
// =============================================================================

/// Enumerates the block storage hardware on the local node.
#[async_trait]
pub trait HardwareProbe: Send + Sync {
    /// List every disk with its partitions
    async fn list_disks(&self) -> Result<Vec<DiskProbe>>;

    /// Probe one disk by short name, e.g. "sdb". Returns None when the
    /// device is not (or no longer) present.
    async fn get_disk(&self, name: &str) -> Result<Option<DiskProbe>>;

    /// Probe the current filesystem state of one disk or partition by short
    /// name, e.g. "sdb1". Used to refresh observed state after a mount.
    async fn get_filesystem(&self, name: &str) -> Result<Option<FilesystemProbe>>;
}

/// Persists BlockDevice records in the control plane.
///
/// The store owns per-name identity and optimistic update semantics; the
/// engine always recomputes from freshly listed state instead of applying
/// stale deltas, so no extra coordination is layered on top.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// List every record in the namespace (one bulk read)
    async fn list_all(&self, namespace: &str) -> Result<Vec<BlockDevice>>;

    /// List records carrying the given label value
    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<BlockDevice>>;

    /// Create a new record
    async fn create(&self, device: &BlockDevice) -> Result<BlockDevice>;

    /// Update an existing record, preserving its identity
    async fn update(&self, device: &BlockDevice) -> Result<BlockDevice>;

    /// Delete a record by name; deleting an absent record is not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Performs the actual format and mount system operations.
#[async_trait]
pub trait FilesystemOps: Send + Sync {
    /// Create a filesystem on the device
    async fn format(&self, dev_path: &str, fs_type: &str) -> Result<()>;

    /// Mount the device at the given path, creating the directory if needed
    async fn mount(&self, dev_path: &str, mount_point: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(format!("{}", DriveKind::Ssd), "SSD");
        assert_eq!(format!("{}", DriveKind::Unknown), "Unknown");
        assert_eq!(format!("{}", ControllerKind::Nvme), "NVMe");
        assert_eq!(format!("{}", ControllerKind::Virtio), "virtio");
    }

    #[test]
    fn test_disk_probe_defaults() {
        let probe = DiskProbe {
            name: "sda".into(),
            ..Default::default()
        };
        assert_eq!(probe.drive_type, DriveKind::Unknown);
        assert!(probe.partitions.is_empty());
        assert!(probe.file_system.mount_point.is_empty());
    }
}
