//! Shared test doubles for the reconciliation engine
//!
//! FakeProbe and FakeFsOps stand in for the sysfs probe and the mkfs/mount
//! adapters so engine behavior can be tested against scripted hardware.

use crate::domain::ports::{
    DiskProbe, FilesystemOps, FilesystemProbe, HardwareProbe, PartitionProbe,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// FakeProbe
// =============================================================================

/// HardwareProbe double returning a scripted set of disks
pub struct FakeProbe {
    disks: Mutex<Vec<DiskProbe>>,
    /// Filesystem state overrides, keyed by short device name
    filesystems: Mutex<BTreeMap<String, FilesystemProbe>>,
    failing: bool,
}

impl FakeProbe {
    pub fn new(disks: Vec<DiskProbe>) -> Self {
        Self {
            disks: Mutex::new(disks),
            filesystems: Mutex::new(BTreeMap::new()),
            failing: false,
        }
    }

    /// A probe whose every call fails
    pub fn failing() -> Self {
        Self {
            disks: Mutex::new(Vec::new()),
            filesystems: Mutex::new(BTreeMap::new()),
            failing: true,
        }
    }

    /// Override the observed filesystem of one device
    pub fn set_filesystem(&self, name: &str, fs: FilesystemProbe) {
        self.filesystems.lock().insert(name.to_string(), fs);
    }

    fn check_failure(&self) -> Result<()> {
        if self.failing {
            return Err(Error::HardwareProbe("injected probe failure".into()));
        }
        Ok(())
    }

    fn find_partition(&self, name: &str) -> Option<PartitionProbe> {
        self.disks
            .lock()
            .iter()
            .flat_map(|d| d.partitions.iter())
            .find(|p| p.name == name)
            .cloned()
    }
}

#[async_trait]
impl HardwareProbe for FakeProbe {
    async fn list_disks(&self) -> Result<Vec<DiskProbe>> {
        self.check_failure()?;
        Ok(self.disks.lock().clone())
    }

    async fn get_disk(&self, name: &str) -> Result<Option<DiskProbe>> {
        self.check_failure()?;
        Ok(self.disks.lock().iter().find(|d| d.name == name).cloned())
    }

    async fn get_filesystem(&self, name: &str) -> Result<Option<FilesystemProbe>> {
        self.check_failure()?;
        if let Some(fs) = self.filesystems.lock().get(name) {
            return Ok(Some(fs.clone()));
        }
        if let Some(disk) = self.disks.lock().iter().find(|d| d.name == name) {
            return Ok(Some(disk.file_system.clone()));
        }
        Ok(self.find_partition(name).map(|p| p.file_system))
    }
}

// =============================================================================
// FakeFsOps
// =============================================================================

/// FilesystemOps double with call counters and failure injection
#[derive(Default)]
pub struct FakeFsOps {
    format_count: AtomicUsize,
    mount_count: AtomicUsize,
    mount_failure: Option<String>,
    /// On a successful mount, feed the observed filesystem back into the probe
    probe_feedback: Option<(Arc<FakeProbe>, String)>,
}

impl FakeFsOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mount fail with the given reason
    pub fn with_mount_failure(mut self, reason: &str) -> Self {
        self.mount_failure = Some(reason.to_string());
        self
    }

    /// Reflect successful mounts into the probe, as a real mount would
    pub fn with_probe_feedback(mut self, probe: Arc<FakeProbe>, fs_type: &str) -> Self {
        self.probe_feedback = Some((probe, fs_type.to_string()));
        self
    }

    /// Number of format attempts
    pub fn format_calls(&self) -> usize {
        self.format_count.load(Ordering::SeqCst)
    }

    /// Number of mount attempts
    pub fn mount_calls(&self) -> usize {
        self.mount_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilesystemOps for FakeFsOps {
    async fn format(&self, _dev_path: &str, _fs_type: &str) -> Result<()> {
        self.format_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mount(&self, dev_path: &str, mount_point: &str) -> Result<()> {
        self.mount_count.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.mount_failure {
            return Err(Error::MountFailed {
                device: dev_path.to_string(),
                mount_point: mount_point.to_string(),
                reason: reason.clone(),
            });
        }
        if let Some((probe, fs_type)) = &self.probe_feedback {
            probe.set_filesystem(
                dev_path.trim_start_matches("/dev/"),
                FilesystemProbe {
                    fs_type: fs_type.clone(),
                    mount_point: mount_point.to_string(),
                    is_read_only: false,
                },
            );
        }
        Ok(())
    }
}
