//! Topology Builder
//!
//! Converts one probed disk into its record tree: a parent disk record
//! followed by one record per partition, in probe order. Partition records
//! are deep copies of the disk record with partition-specific overrides and
//! a parent-device label linking back to the disk record by name.

use crate::crd::{
    BlockDevice, BlockDeviceSpec, BlockDeviceState, BlockDeviceStatus, DeviceCapacity,
    DeviceDetails, DeviceStatus, DeviceType, FilesystemInfo, FilesystemStatus, HOSTNAME_LABEL,
    PARENT_DEVICE_LABEL,
};
use crate::domain::ports::{DiskProbe, FilesystemProbe, PartitionProbe};
use crate::topology::naming::{block_device_name, full_dev_path};
use std::collections::BTreeMap;

/// Build the record tree for one probed disk.
///
/// A disk with no partitions still yields exactly one record.
pub fn build_device_records(
    disk: &DiskProbe,
    node_name: &str,
    namespace: &str,
) -> Vec<BlockDevice> {
    let partitioned = !disk.partitions.is_empty();
    let file_system = filesystem_status(&disk.file_system);

    let spec = BlockDeviceSpec {
        node_name: node_name.to_string(),
        dev_path: full_dev_path(&disk.name),
        // The probe, not user intent, seeds the initial spec.
        file_system: FilesystemInfo {
            fs_type: disk.file_system.fs_type.clone(),
            mount_point: disk.file_system.mount_point.clone(),
            force_formatted: false,
        },
    };

    let mut parent = BlockDevice::new(&block_device_name(&disk.name, node_name), spec);
    parent.metadata.namespace = Some(namespace.to_string());
    parent.metadata.labels = Some(BTreeMap::from([(
        HOSTNAME_LABEL.to_string(),
        node_name.to_string(),
    )]));
    parent.status = Some(BlockDeviceStatus {
        state: BlockDeviceState::Active,
        device_status: DeviceStatus {
            partitioned,
            capacity: DeviceCapacity {
                size_bytes: disk.size_bytes,
                physical_block_size_bytes: disk.physical_block_size_bytes,
            },
            details: DeviceDetails {
                device_type: DeviceType::Disk,
                drive_type: disk.drive_type.to_string(),
                is_removable: disk.is_removable,
                storage_controller: disk.storage_controller.to_string(),
                uuid: disk.uuid.clone(),
                pt_uuid: disk.pt_uuid.clone(),
                bus_path: disk.bus_path.clone(),
                model: disk.model.clone(),
                vendor: disk.vendor.clone(),
                serial_number: disk.serial_number.clone(),
                numa_node_id: disk.numa_node_id,
                wwn: disk.wwn.clone(),
                label: String::new(),
                part_uuid: String::new(),
            },
            file_system,
            parent_device: String::new(),
        },
        conditions: Vec::new(),
    });

    let mut records = Vec::with_capacity(disk.partitions.len() + 1);
    let partitions = build_partition_records(&disk.partitions, &parent, node_name);
    records.push(parent);
    records.extend(partitions);
    records
}

/// Build partition records by deep-copying the parent disk record and
/// overriding the partition-specific fields.
fn build_partition_records(
    partitions: &[PartitionProbe],
    parent: &BlockDevice,
    node_name: &str,
) -> Vec<BlockDevice> {
    let mut records = Vec::with_capacity(partitions.len());
    for part in partitions {
        let mut record = parent.clone();
        record.metadata.name = Some(block_device_name(&part.name, node_name));
        record
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(
                PARENT_DEVICE_LABEL.to_string(),
                parent.metadata.name.clone().unwrap_or_default(),
            );

        record.spec.dev_path = full_dev_path(&part.name);
        record.spec.file_system.fs_type = part.file_system.fs_type.clone();
        record.spec.file_system.mount_point = part.file_system.mount_point.clone();

        if let Some(status) = record.status.as_mut() {
            status.device_status.partitioned = false;
            status.device_status.parent_device = parent.spec.dev_path.clone();
            status.device_status.details.device_type = DeviceType::Part;
            status.device_status.capacity.size_bytes = part.size_bytes;
            status.device_status.details.label = part.label.clone();
            status.device_status.details.part_uuid = part.uuid.clone();
            status.device_status.file_system = filesystem_status(&part.file_system);
        }

        records.push(record);
    }
    records
}

fn filesystem_status(probe: &FilesystemProbe) -> FilesystemStatus {
    FilesystemStatus {
        fs_type: probe.fs_type.clone(),
        mount_point: probe.mount_point.clone(),
        is_read_only: probe.is_read_only,
        last_formatted_at: None,
    }
}
