//! Sysfs Block Device Probe
//!
//! Enumerates whole disks and their partitions from sysfs and resolves
//! their current filesystem state from the mount table. This is the
//! production HardwareProbe adapter; it reads local files only and never
//! touches the control plane.

use crate::domain::ports::{
    ControllerKind, DiskProbe, DriveKind, FilesystemProbe, HardwareProbe, PartitionProbe,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// =============================================================================
// Constants
// =============================================================================

const SECTOR_SIZE: u64 = 512;

// =============================================================================
// Probe Configuration
// =============================================================================

/// Configuration for the sysfs probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Path to sysfs (overridable for testing)
    pub sysfs_path: PathBuf,
    /// Path to the mount table
    pub mounts_path: PathBuf,
    /// Path to udev's persistent device database
    pub udev_data_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sysfs_path: PathBuf::from("/sys"),
            mounts_path: PathBuf::from("/proc/self/mounts"),
            udev_data_path: PathBuf::from("/run/udev/data"),
        }
    }
}

// =============================================================================
// Sysfs Probe
// =============================================================================

/// HardwareProbe adapter over sysfs and the mount table
pub struct SysfsProbe {
    config: ProbeConfig,
}

impl SysfsProbe {
    /// Create a new probe
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Create a probe with default paths
    pub fn default_probe() -> Self {
        Self::new(ProbeConfig::default())
    }

    fn block_class_path(&self) -> PathBuf {
        self.config.sysfs_path.join("class/block")
    }

    /// Read the current mount table, keyed by /dev path
    fn read_mounts(&self) -> Vec<MountEntry> {
        match fs::read_to_string(&self.config.mounts_path) {
            Ok(table) => parse_mounts(&table),
            Err(e) => {
                warn!("failed to read mount table: {}", e);
                Vec::new()
            }
        }
    }

    /// Scan one whole disk, including its partitions
    fn scan_disk(&self, sysfs_path: &Path, mounts: &[MountEntry]) -> Result<DiskProbe> {
        let name = sysfs_path
            .file_name()
            .ok_or_else(|| Error::HardwareProbe("invalid sysfs path".into()))?
            .to_string_lossy()
            .to_string();

        let size_bytes = self.read_sectors(sysfs_path, "size")? * SECTOR_SIZE;
        let physical_block_size_bytes = self
            .read_sysfs_attr(sysfs_path, "queue/physical_block_size")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(SECTOR_SIZE);

        let is_removable = self
            .read_sysfs_attr(sysfs_path, "removable")
            .map(|s| s.trim() == "1")
            .unwrap_or(false);

        let model = self.read_device_attr(sysfs_path, "model");
        let vendor = self.read_device_attr(sysfs_path, "vendor");
        let serial_number = self.read_device_attr(sysfs_path, "serial");
        let wwn = self.read_device_attr(sysfs_path, "wwid");
        let numa_node_id = self
            .read_sysfs_attr(sysfs_path, "device/numa_node")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(-1);

        let udev = self.read_udev_properties(sysfs_path);

        let mut disk = DiskProbe {
            name: name.clone(),
            size_bytes,
            physical_block_size_bytes,
            bus_path: udev.get("ID_PATH").cloned().unwrap_or_default(),
            drive_type: self.detect_drive_kind(sysfs_path, &udev),
            is_removable,
            storage_controller: controller_for_name(&name),
            uuid: udev.get("ID_FS_UUID").cloned().unwrap_or_default(),
            pt_uuid: udev.get("ID_PART_TABLE_UUID").cloned().unwrap_or_default(),
            model,
            vendor,
            serial_number,
            numa_node_id,
            wwn,
            file_system: filesystem_for(&name, mounts, &udev),
            partitions: Vec::new(),
        };

        disk.partitions = self.scan_partitions(sysfs_path, &name, mounts);
        Ok(disk)
    }

    /// Scan the partitions nested under a disk's sysfs entry
    fn scan_partitions(&self, disk_path: &Path, disk: &str, mounts: &[MountEntry]) -> Vec<PartitionProbe> {
        let mut partitions = Vec::new();

        let entries = match fs::read_dir(disk_path) {
            Ok(entries) => entries,
            Err(_) => return partitions,
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            // Partition entries nest under the disk and carry a "partition" file
            if !name.starts_with(disk) || !entry.path().join("partition").exists() {
                continue;
            }

            let size_bytes = self
                .read_sectors(&entry.path(), "size")
                .map(|s| s * SECTOR_SIZE)
                .unwrap_or(0);
            let udev = self.read_udev_properties(&entry.path());

            partitions.push(PartitionProbe {
                name: name.clone(),
                size_bytes,
                label: udev.get("ID_FS_LABEL").cloned().unwrap_or_default(),
                uuid: udev.get("ID_PART_ENTRY_UUID").cloned().unwrap_or_default(),
                file_system: filesystem_for(&name, mounts, &udev),
            });
        }

        partitions.sort_by(|a, b| a.name.cmp(&b.name));
        partitions
    }

    /// Detect whether a device is SSD or HDD
    fn detect_drive_kind(
        &self,
        sysfs_path: &Path,
        udev: &std::collections::BTreeMap<String, String>,
    ) -> DriveKind {
        if udev.get("ID_BUS").map(|b| b == "virtio").unwrap_or(false) {
            return DriveKind::Virtual;
        }
        if let Ok(rotational) = self.read_sysfs_attr(sysfs_path, "queue/rotational") {
            return match rotational.trim() {
                "0" => DriveKind::Ssd,
                "1" => DriveKind::Hdd,
                _ => DriveKind::Unknown,
            };
        }
        DriveKind::Unknown
    }

    /// Read this device's persistent udev properties
    fn read_udev_properties(
        &self,
        sysfs_path: &Path,
    ) -> std::collections::BTreeMap<String, String> {
        let dev = match self.read_sysfs_attr(sysfs_path, "dev") {
            Ok(dev) => dev.trim().to_string(),
            Err(_) => return Default::default(),
        };
        let db_path = self.config.udev_data_path.join(format!("b{}", dev));
        match fs::read_to_string(&db_path) {
            Ok(text) => parse_udev_data(&text),
            Err(e) => {
                debug!("no udev data for {}: {}", dev, e);
                Default::default()
            }
        }
    }

    /// Read an optional device/ attribute, empty when absent
    fn read_device_attr(&self, sysfs_path: &Path, attr: &str) -> String {
        self.read_sysfs_attr(sysfs_path, &format!("device/{}", attr))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// Read a required size attribute in 512-byte sectors
    fn read_sectors(&self, sysfs_path: &Path, attr: &str) -> Result<u64> {
        let raw = self.read_sysfs_attr(sysfs_path, attr)?;
        raw.trim()
            .parse()
            .map_err(|_| Error::HardwareProbe(format!("invalid size attribute: {}", raw.trim())))
    }

    /// Read a sysfs attribute
    fn read_sysfs_attr(&self, base_path: &Path, attr: &str) -> Result<String> {
        let path = base_path.join(attr);
        fs::read_to_string(&path)
            .map_err(|e| Error::HardwareProbe(format!("failed to read {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl HardwareProbe for SysfsProbe {
    async fn list_disks(&self) -> Result<Vec<DiskProbe>> {
        let block_path = self.block_class_path();
        if !block_path.exists() {
            return Err(Error::HardwareProbe("block device sysfs not found".into()));
        }

        let mounts = self.read_mounts();
        let mut disks = Vec::new();

        for entry in fs::read_dir(&block_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if !is_whole_disk_name(&name) {
                continue;
            }
            // Partitions appear in class/block too; skip them here, they are
            // picked up while scanning their parent disk.
            if entry.path().join("partition").exists() {
                continue;
            }

            match self.scan_disk(&entry.path(), &mounts) {
                Ok(disk) => disks.push(disk),
                Err(e) => warn!(device = %name, "skipping unreadable device: {}", e),
            }
        }

        disks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(disks)
    }

    async fn get_disk(&self, name: &str) -> Result<Option<DiskProbe>> {
        let path = self.block_class_path().join(name);
        if !path.exists() || path.join("partition").exists() {
            return Ok(None);
        }
        let mounts = self.read_mounts();
        self.scan_disk(&path, &mounts).map(Some)
    }

    async fn get_filesystem(&self, name: &str) -> Result<Option<FilesystemProbe>> {
        let path = self.block_class_path().join(name);
        if !path.exists() {
            return Ok(None);
        }
        let mounts = self.read_mounts();
        let udev = self.read_udev_properties(&path);
        Ok(Some(filesystem_for(name, &mounts, &udev)))
    }
}

// =============================================================================
// Pure Helpers
// =============================================================================

/// One line of the mount table
#[derive(Debug, Clone, PartialEq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub read_only: bool,
}

/// Parse a /proc/self/mounts style table
pub fn parse_mounts(table: &str) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?.to_string();
            let mount_point = fields.next()?.to_string();
            let fs_type = fields.next()?.to_string();
            let options = fields.next().unwrap_or("");
            Some(MountEntry {
                device,
                mount_point: unescape_mount_path(&mount_point),
                fs_type,
                read_only: options.split(',').any(|opt| opt == "ro"),
            })
        })
        .collect()
}

/// Decode the octal escapes the kernel uses for spaces and tabs in paths
fn unescape_mount_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 {
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse udev's persistent property database format (E: lines)
fn parse_udev_data(text: &str) -> std::collections::BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("E:"))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Resolve the observed filesystem of a device from mounts and udev data
fn filesystem_for(
    name: &str,
    mounts: &[MountEntry],
    udev: &std::collections::BTreeMap<String, String>,
) -> FilesystemProbe {
    let dev_path = format!("/dev/{}", name);
    let mount = mounts.iter().find(|m| m.device == dev_path);
    FilesystemProbe {
        fs_type: mount
            .map(|m| m.fs_type.clone())
            .or_else(|| udev.get("ID_FS_TYPE").cloned())
            .unwrap_or_default(),
        mount_point: mount.map(|m| m.mount_point.clone()).unwrap_or_default(),
        is_read_only: mount.map(|m| m.read_only).unwrap_or(false),
    }
}

/// Guess the controller kind from the device naming convention
fn controller_for_name(name: &str) -> ControllerKind {
    if name.starts_with("nvme") {
        ControllerKind::Nvme
    } else if name.starts_with("mmcblk") {
        ControllerKind::Mmc
    } else if name.starts_with("vd") {
        ControllerKind::Virtio
    } else if name.starts_with("loop") {
        ControllerKind::Loop
    } else if name.starts_with("hd") {
        ControllerKind::Ide
    } else if name.starts_with("sd") {
        ControllerKind::Scsi
    } else {
        ControllerKind::Unknown
    }
}

/// Whether a class/block entry name is a device we manage at all.
/// Loopback, RAM, device mapper, md RAID and zram entries are skipped.
fn is_whole_disk_name(name: &str) -> bool {
    const SKIPPED_PREFIXES: &[&str] = &["loop", "ram", "dm-", "md", "zram", "fd"];
    !SKIPPED_PREFIXES.iter().any(|p| name.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mounts() {
        let table = "\
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb1 /var/lib/data ext4 ro,noatime 0 0
tmpfs /tmp tmpfs rw 0 0
";
        let mounts = parse_mounts(table);
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].device, "/dev/sda1");
        assert_eq!(mounts[0].fs_type, "ext4");
        assert!(!mounts[0].read_only);
        assert!(mounts[1].read_only);
        assert_eq!(mounts[1].mount_point, "/var/lib/data");
    }

    #[test]
    fn test_parse_mounts_unescapes_spaces() {
        let mounts = parse_mounts("/dev/sdc1 /mnt/with\\040space ext4 rw 0 0\n");
        assert_eq!(mounts[0].mount_point, "/mnt/with space");
    }

    #[test]
    fn test_parse_udev_data() {
        let text = "\
S:disk/by-path/pci-0000:00:1f.2-ata-1
E:ID_PATH=pci-0000:00:1f.2-ata-1
E:ID_FS_TYPE=ext4
E:ID_FS_UUID=6fa460ae-4e77-4b54-8d2b-2a0c1b0b0a11
";
        let props = parse_udev_data(text);
        assert_eq!(
            props.get("ID_PATH").map(String::as_str),
            Some("pci-0000:00:1f.2-ata-1")
        );
        assert_eq!(props.get("ID_FS_TYPE").map(String::as_str), Some("ext4"));
        assert!(props.get("S").is_none());
    }

    #[test]
    fn test_filesystem_for_prefers_mount_table() {
        let mounts = parse_mounts("/dev/sdb1 /data xfs rw 0 0\n");
        let mut udev = std::collections::BTreeMap::new();
        udev.insert("ID_FS_TYPE".to_string(), "ext4".to_string());

        let fs = filesystem_for("sdb1", &mounts, &udev);
        assert_eq!(fs.fs_type, "xfs");
        assert_eq!(fs.mount_point, "/data");

        // unmounted devices fall back to the udev-reported type
        let fs = filesystem_for("sdb2", &mounts, &udev);
        assert_eq!(fs.fs_type, "ext4");
        assert!(fs.mount_point.is_empty());
    }

    #[test]
    fn test_controller_for_name() {
        assert_eq!(controller_for_name("sda"), ControllerKind::Scsi);
        assert_eq!(controller_for_name("nvme0n1"), ControllerKind::Nvme);
        assert_eq!(controller_for_name("vda"), ControllerKind::Virtio);
        assert_eq!(controller_for_name("mmcblk0"), ControllerKind::Mmc);
        assert_eq!(controller_for_name("hda"), ControllerKind::Ide);
        assert_eq!(controller_for_name("xvda"), ControllerKind::Unknown);
    }

    #[test]
    fn test_is_whole_disk_name() {
        assert!(is_whole_disk_name("sda"));
        assert!(is_whole_disk_name("nvme0n1"));
        assert!(!is_whole_disk_name("loop0"));
        assert!(!is_whole_disk_name("ram0"));
        assert!(!is_whole_disk_name("dm-0"));
        assert!(!is_whole_disk_name("md127"));
        assert!(!is_whole_disk_name("zram0"));
    }
}
