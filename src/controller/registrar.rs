//! Device Registrar
//!
//! The bulk reconciliation path: probes every disk on the node, builds the
//! desired record tree, and diffs it against the published records with a
//! single bulk list. Missing records are created, changed ones updated in
//! place, identical ones left untouched. Disappeared devices are handled by
//! the event path, never by this diff.

use crate::crd::BlockDevice;
use crate::domain::ports::{DeviceStore, HardwareProbe};
use crate::error::Result;
use crate::topology::{build_device_records, is_self_managed};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of saving one desired record against the existing set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No matching record existed; created
    Created,
    /// A matching record existed with differing fields; updated in place
    Updated,
    /// A matching record existed and was already identical
    Unchanged,
}

/// Reconciles the node's probed topology into the record store.
pub struct DeviceRegistrar {
    namespace: String,
    node_name: String,
    store: Arc<dyn DeviceStore>,
    probe: Arc<dyn HardwareProbe>,
}

impl DeviceRegistrar {
    /// Create a new registrar for one node
    pub fn new(
        namespace: impl Into<String>,
        node_name: impl Into<String>,
        store: Arc<dyn DeviceStore>,
        probe: Arc<dyn HardwareProbe>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            node_name: node_name.into(),
            store,
            probe,
        }
    }

    /// Scan the node's block devices and create or update their records.
    ///
    /// Any probe or list failure aborts the whole pass and surfaces to the
    /// caller; retries happen at the caller's scheduling cadence.
    pub async fn register_node_devices(&self) -> Result<()> {
        info!(node = %self.node_name, "Registering block devices of node");

        let mut desired = Vec::new();
        for disk in self.probe.list_disks().await? {
            // Never register a volume this system exposes itself
            if is_self_managed(&disk.bus_path) {
                debug!(disk = %disk.name, "Skipping self-managed disk");
                continue;
            }

            info!(disk = %disk.name, "Found a block device");
            desired.extend(build_device_records(&disk, &self.node_name, &self.namespace));
        }

        // One bulk read regardless of device count
        let existing = self.store.list_all(&self.namespace).await?;

        for record in &desired {
            self.save_device(record, &existing).await?;
        }
        Ok(())
    }

    /// Match one desired record against the existing set by name and apply
    /// the minimal corrective write. Updates preserve the stored record's
    /// identity and write only the observed device state; the spec carries
    /// user-editable mount intent and is written at creation only. Records
    /// are never deleted and recreated.
    pub async fn save_device(
        &self,
        desired: &BlockDevice,
        existing: &[BlockDevice],
    ) -> Result<SaveOutcome> {
        let name = desired.metadata.name.as_deref().unwrap_or_default();

        if let Some(current) = existing
            .iter()
            .find(|bd| bd.metadata.name.as_deref() == Some(name))
        {
            if !needs_update(current, desired) {
                return Ok(SaveOutcome::Unchanged);
            }

            info!(device = %name, dev_path = %current.spec.dev_path, "Updating existing block device");
            let mut to_update = current.clone();
            if let (Some(target), Some(source)) = (to_update.status.as_mut(), desired.status.as_ref())
            {
                target.device_status = source.device_status.clone();
                target.state = source.state;
            } else {
                to_update.status = desired.status.clone();
            }
            self.store.update(&to_update).await?;
            return Ok(SaveOutcome::Updated);
        }

        info!(device = %name, dev_path = %desired.spec.dev_path, "Adding new block device");
        self.store.create(desired).await?;
        Ok(SaveOutcome::Created)
    }
}

/// Compare only the persisted fields the registrar owns: the observed
/// device state. The spec holds user-editable mount intent and conditions
/// belong to the mount state machine; neither may trigger rescan writes.
fn needs_update(current: &BlockDevice, desired: &BlockDevice) -> bool {
    match (current.status.as_ref(), desired.status.as_ref()) {
        (Some(cur), Some(des)) => {
            cur.device_status != des.device_status || cur.state != des.state
        }
        (None, None) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::BlockDeviceState;
    use crate::domain::ports::{DiskProbe, DriveKind, FilesystemProbe, PartitionProbe};
    use crate::store::memory::MemoryDeviceStore;
    use crate::testing::FakeProbe;

    fn probe_with(disks: Vec<DiskProbe>) -> Arc<FakeProbe> {
        Arc::new(FakeProbe::new(disks))
    }

    fn simple_disk(name: &str) -> DiskProbe {
        DiskProbe {
            name: name.to_string(),
            size_bytes: 500_000_000_000,
            drive_type: DriveKind::Hdd,
            bus_path: "pci-0000:00:1f.2".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_record_for_unpartitioned_disk() {
        let store = Arc::new(MemoryDeviceStore::new());
        let probe = probe_with(vec![simple_disk("sda")]);
        let registrar = DeviceRegistrar::new("ns", "node-1", store.clone(), probe);

        registrar.register_node_devices().await.unwrap();

        let records = store.list_all("ns").await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.metadata.name.as_deref(), Some("node-1-sda"));
        assert!(!record.status.as_ref().unwrap().device_status.partitioned);
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_creates_partition_records_with_parent_links() {
        let mut disk = simple_disk("sdb");
        disk.partitions = vec![
            PartitionProbe {
                name: "sdb1".into(),
                size_bytes: 1_000,
                ..Default::default()
            },
            PartitionProbe {
                name: "sdb2".into(),
                size_bytes: 2_000,
                ..Default::default()
            },
        ];
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new("ns", "node-1", store.clone(), probe_with(vec![disk]));

        registrar.register_node_devices().await.unwrap();

        let records = store.list_all("ns").await.unwrap();
        assert_eq!(records.len(), 3);

        let children = store
            .list_by_label("ns", crate::crd::PARENT_DEVICE_LABEL, "node-1-sdb")
            .await
            .unwrap();
        let mut names: Vec<_> = children
            .iter()
            .map(|bd| bd.metadata.name.clone().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["node-1-sdb1", "node-1-sdb2"]);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = Arc::new(MemoryDeviceStore::new());
        let mut disk = simple_disk("sdb");
        disk.partitions = vec![PartitionProbe {
            name: "sdb1".into(),
            ..Default::default()
        }];
        let registrar = DeviceRegistrar::new("ns", "node-1", store.clone(), probe_with(vec![disk]));

        registrar.register_node_devices().await.unwrap();
        let creates = store.create_calls();
        let updates = store.update_calls();

        registrar.register_node_devices().await.unwrap();
        assert_eq!(store.create_calls(), creates);
        assert_eq!(store.update_calls(), updates);
    }

    #[tokio::test]
    async fn test_updates_changed_record_in_place() {
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new(
            "ns",
            "node-1",
            store.clone(),
            probe_with(vec![simple_disk("sda")]),
        );
        registrar.register_node_devices().await.unwrap();

        // Capacity changed on the next probe
        let mut grown = simple_disk("sda");
        grown.size_bytes = 600_000_000_000;
        let registrar =
            DeviceRegistrar::new("ns", "node-1", store.clone(), probe_with(vec![grown]));
        registrar.register_node_devices().await.unwrap();

        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.update_calls(), 1);
        let records = store.list_all("ns").await.unwrap();
        assert_eq!(
            records[0]
                .status
                .as_ref()
                .unwrap()
                .device_status
                .capacity
                .size_bytes,
            600_000_000_000
        );
    }

    #[tokio::test]
    async fn test_rescan_never_deletes_absent_devices() {
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new(
            "ns",
            "node-1",
            store.clone(),
            probe_with(vec![simple_disk("sda"), simple_disk("sdb")]),
        );
        registrar.register_node_devices().await.unwrap();

        // sdb gone from the next probe; its record must survive the rescan
        let registrar = DeviceRegistrar::new(
            "ns",
            "node-1",
            store.clone(),
            probe_with(vec![simple_disk("sda")]),
        );
        registrar.register_node_devices().await.unwrap();

        assert_eq!(store.list_all("ns").await.unwrap().len(), 2);
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_skips_self_managed_disks() {
        let mut disk = simple_disk("sdc");
        disk.bus_path = "/devices/virtual/block/longhorn-vol-3".into();
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new("ns", "node-1", store.clone(), probe_with(vec![disk]));

        registrar.register_node_devices().await.unwrap();
        assert!(store.list_all("ns").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rescan_does_not_touch_conditions() {
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new(
            "ns",
            "node-1",
            store.clone(),
            probe_with(vec![simple_disk("sda")]),
        );
        registrar.register_node_devices().await.unwrap();

        // The mount state machine sets a condition out of band
        let mut record = store.list_all("ns").await.unwrap().remove(0);
        record.set_mounted_condition(true, "", "");
        store.update(&record).await.unwrap();
        let updates = store.update_calls();

        // An unchanged rescan must not rewrite the record
        registrar.register_node_devices().await.unwrap();
        assert_eq!(store.update_calls(), updates);
        let record = store.list_all("ns").await.unwrap().remove(0);
        assert!(record.mounted_condition().is_some());
    }

    #[tokio::test]
    async fn test_probe_failure_aborts_pass() {
        let store = Arc::new(MemoryDeviceStore::new());
        let probe = Arc::new(FakeProbe::failing());
        let registrar = DeviceRegistrar::new("ns", "node-1", store.clone(), probe);

        assert!(registrar.register_node_devices().await.is_err());
        assert_eq!(store.create_calls(), 0);
    }

    #[test]
    fn test_needs_update_ignores_conditions_and_spec() {
        let disk = simple_disk("sda");
        let records = build_device_records(&disk, "node-1", "ns");
        let desired = &records[0];

        let mut current = desired.clone();
        current
            .status
            .as_mut()
            .unwrap()
            .set_condition(crate::crd::CONDITION_MOUNTED, true, "", "");
        assert!(!needs_update(&current, desired));

        // User-edited mount intent is not drift
        current.spec.file_system.mount_point = "/mnt/elsewhere".into();
        assert!(!needs_update(&current, desired));

        current
            .status
            .as_mut()
            .unwrap()
            .device_status
            .capacity
            .size_bytes += 1;
        assert!(needs_update(&current, desired));
    }

    #[tokio::test]
    async fn test_rescan_preserves_user_mount_intent() {
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new(
            "ns",
            "node-1",
            store.clone(),
            probe_with(vec![simple_disk("sda")]),
        );
        registrar.register_node_devices().await.unwrap();

        // User declares a mount intent on the stored record
        let mut record = store.list_all("ns").await.unwrap().remove(0);
        record.spec.file_system.mount_point = "/var/lib/disks/1".into();
        record.spec.file_system.force_formatted = true;
        store.update(&record).await.unwrap();
        let updates = store.update_calls();

        // An unchanged rescan performs no write at all
        registrar.register_node_devices().await.unwrap();
        assert_eq!(store.update_calls(), updates);

        // A rescan that does write observed state still leaves the intent alone
        let mut grown = simple_disk("sda");
        grown.size_bytes = 600_000_000_000;
        let registrar =
            DeviceRegistrar::new("ns", "node-1", store.clone(), probe_with(vec![grown]));
        registrar.register_node_devices().await.unwrap();

        let record = store.list_all("ns").await.unwrap().remove(0);
        assert_eq!(record.spec.file_system.mount_point, "/var/lib/disks/1");
        assert!(record.spec.file_system.force_formatted);
        assert_eq!(
            record
                .status
                .as_ref()
                .unwrap()
                .device_status
                .capacity
                .size_bytes,
            600_000_000_000
        );
    }

    #[tokio::test]
    async fn test_detached_record_reactivates_on_rescan() {
        let store = Arc::new(MemoryDeviceStore::new());
        let registrar = DeviceRegistrar::new(
            "ns",
            "node-1",
            store.clone(),
            probe_with(vec![simple_disk("sda")]),
        );
        registrar.register_node_devices().await.unwrap();

        let mut record = store.list_all("ns").await.unwrap().remove(0);
        record.status.as_mut().unwrap().state = BlockDeviceState::Detached;
        store.update(&record).await.unwrap();

        registrar.register_node_devices().await.unwrap();
        let record = store.list_all("ns").await.unwrap().remove(0);
        assert_eq!(record.status.unwrap().state, BlockDeviceState::Active);
    }

    #[test]
    fn test_builder_seeds_filesystem_from_probe() {
        let mut disk = simple_disk("sda");
        disk.file_system = FilesystemProbe {
            fs_type: "ext4".into(),
            mount_point: "/var/lib/data".into(),
            is_read_only: false,
        };
        let records = build_device_records(&disk, "node-1", "ns");
        assert_eq!(records[0].spec.file_system.mount_point, "/var/lib/data");
    }
}
