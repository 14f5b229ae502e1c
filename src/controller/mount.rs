//! Mount State Machine
//!
//! Evaluated on every change notification for a record with a non-empty
//! mount-point intent. Validates the declared filesystem against the
//! observed one, drives the external format/mount operations when they
//! disagree, and records the outcome on the Mounted condition. Writes back
//! only when the computed record differs from the stored one.

use crate::crd::{BlockDevice, FilesystemInfo, FilesystemStatus};
use crate::domain::ports::{DeviceStore, FilesystemOps, HardwareProbe};
use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Filesystems the agent will accept as a valid mount target
pub const SUPPORTED_FILESYSTEMS: &[&str] = &["ext4", "xfs"];

/// Filesystem used when a force-format is requested without an explicit type
const DEFAULT_FS_TYPE: &str = "ext4";

/// Drives the per-record mount/format lifecycle.
pub struct MountReconciler {
    store: Arc<dyn DeviceStore>,
    probe: Arc<dyn HardwareProbe>,
    fs_ops: Arc<dyn FilesystemOps>,
}

impl MountReconciler {
    /// Create a new mount reconciler
    pub fn new(
        store: Arc<dyn DeviceStore>,
        probe: Arc<dyn HardwareProbe>,
        fs_ops: Arc<dyn FilesystemOps>,
    ) -> Self {
        Self {
            store,
            probe,
            fs_ops,
        }
    }

    /// Handle one change notification for a record.
    ///
    /// Mount and format failures are recorded on the Mounted condition and
    /// are not retried here; the store's next change notification re-runs
    /// the evaluation from current observed state.
    pub async fn on_device_change(&self, device: &BlockDevice) -> Result<()> {
        if device.metadata.deletion_timestamp.is_some() {
            return Ok(());
        }
        if device.spec.file_system.mount_point.is_empty() {
            return Ok(());
        }

        // Mutate a copy; the original stays visible to other readers until
        // the new version is ready to publish.
        let mut device_cpy = device.clone();
        let fs = device_cpy.spec.file_system.clone();
        let fs_status = device_cpy
            .status
            .as_ref()
            .map(|s| s.device_status.file_system.clone())
            .unwrap_or_default();

        if validate_filesystem(&fs, &fs_status).is_err() {
            info!(
                device = %device.spec.dev_path,
                mount_point = %fs.mount_point,
                "Performing disk operation"
            );

            if fs.force_formatted && fs_status.last_formatted_at.is_none() {
                let fs_type = if fs.fs_type.is_empty() {
                    DEFAULT_FS_TYPE
                } else {
                    &fs.fs_type
                };
                let format_result = self.fs_ops.format(&device.spec.dev_path, fs_type).await;
                // Stamp even on failure: format runs at most once per record
                if let Some(status) = device_cpy.status.as_mut() {
                    status.device_status.file_system.last_formatted_at = Some(Utc::now());
                }
                if let Err(e) = format_result {
                    warn!(device = %device.spec.dev_path, error = %e, "Format failed");
                    device_cpy.set_mounted_condition(
                        false,
                        "FormatFailed",
                        &format!(
                            "failed to format the device {}: {}",
                            device.spec.dev_path, e
                        ),
                    );
                    return self.persist_if_changed(device, &device_cpy).await;
                }
            }

            if let Err(e) = self.fs_ops.mount(&device.spec.dev_path, &fs.mount_point).await {
                warn!(device = %device.spec.dev_path, error = %e, "Mount failed");
                device_cpy.set_mounted_condition(
                    false,
                    "MountFailed",
                    &format!(
                        "failed to mount the device {} to path {}: {}",
                        device.spec.dev_path, fs.mount_point, e
                    ),
                );
                return self.persist_if_changed(device, &device_cpy).await;
            }

            // Refresh observed filesystem from a fresh probe of the device.
            // A probe failure must not discard what already happened: the
            // format stamp has to reach the store or the next evaluation
            // would format the device a second time.
            let short_name = device.spec.dev_path.trim_start_matches("/dev/");
            match self.probe.get_filesystem(short_name).await {
                Ok(Some(observed)) => {
                    if let Some(status) = device_cpy.status.as_mut() {
                        status.device_status.file_system.fs_type = observed.fs_type;
                        status.device_status.file_system.mount_point = observed.mount_point;
                        status.device_status.file_system.is_read_only = observed.is_read_only;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(device = %device.spec.dev_path, error = %e, "Probe refresh failed");
                    device_cpy.set_mounted_condition(
                        false,
                        "ProbeFailed",
                        &format!(
                            "failed to probe the device {} after the disk operation: {}",
                            device.spec.dev_path, e
                        ),
                    );
                    return self.persist_if_changed(device, &device_cpy).await;
                }
            }
        }

        let fs_status = device_cpy
            .status
            .as_ref()
            .map(|s| s.device_status.file_system.clone())
            .unwrap_or_default();
        match validate_filesystem(&device_cpy.spec.file_system, &fs_status) {
            Ok(()) => {
                let mounted = !fs_status.mount_point.is_empty();
                device_cpy.set_mounted_condition(mounted, "", "");
            }
            Err(reason) => {
                device_cpy.set_mounted_condition(false, "InvalidFilesystem", &reason);
            }
        }

        self.persist_if_changed(device, &device_cpy).await
    }

    async fn persist_if_changed(&self, stored: &BlockDevice, computed: &BlockDevice) -> Result<()> {
        if stored != computed {
            self.store.update(computed).await?;
        }
        Ok(())
    }
}

/// Check the declared filesystem intent against the observed state.
///
/// Returns the mismatch description on failure; a mismatch is a condition
/// message, never a hard error.
pub fn validate_filesystem(
    fs: &FilesystemInfo,
    fs_status: &FilesystemStatus,
) -> std::result::Result<(), String> {
    let mut mount_point = fs.mount_point.as_str();
    if mount_point.len() > 1 {
        mount_point = mount_point.trim_end_matches('/');
    }

    if mount_point != fs_status.mount_point {
        return Err(format!(
            "current mountPoint {} does not match the specified path: {}",
            fs_status.mount_point, mount_point
        ));
    }

    if !SUPPORTED_FILESYSTEMS.contains(&fs_status.fs_type.as_str()) {
        return Err(format!("unsupported filesystem type {}", fs_status.fs_type));
    }

    Ok(())
}
