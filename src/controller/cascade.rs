//! Cascade Deletion
//!
//! Removal of a disk record deletes every record whose parent-device label
//! names it; removal of a Node record deletes every record the node owns.
//! Both are single bounded fan-outs over the two-level disk/partition
//! hierarchy, best-effort per child: the first delete failure aborts the
//! remaining fan-out and surfaces, and retrying the invocation is safe
//! because record deletion is idempotent.

use crate::crd::{BlockDevice, HOSTNAME_LABEL, PARENT_DEVICE_LABEL};
use crate::domain::ports::DeviceStore;
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Removes dependent records when their parent or owning node goes away.
pub struct CascadeDeleter {
    namespace: String,
    store: Arc<dyn DeviceStore>,
}

impl CascadeDeleter {
    /// Create a new cascade deleter
    pub fn new(namespace: impl Into<String>, store: Arc<dyn DeviceStore>) -> Self {
        Self {
            namespace: namespace.into(),
            store,
        }
    }

    /// Handle removal of a device record: delete every record whose
    /// parent-device label equals the removed record's name.
    pub async fn on_device_removed(&self, device: &BlockDevice) -> Result<()> {
        let Some(name) = device.metadata.name.as_deref() else {
            return Ok(());
        };

        let children = self
            .store
            .list_by_label(&self.namespace, PARENT_DEVICE_LABEL, name)
            .await?;

        for child in &children {
            let child_name = child.metadata.name.as_deref().unwrap_or_default();
            info!(parent = %name, child = %child_name, "Deleting partition record of removed disk");
            self.store.delete(&self.namespace, child_name).await?;
        }
        Ok(())
    }

    /// Handle removal of a node record: delete every device record labeled
    /// with the node's hostname, disks and partitions alike.
    pub async fn on_node_removed(&self, node_name: &str) -> Result<()> {
        let owned = self
            .store
            .list_by_label(&self.namespace, HOSTNAME_LABEL, node_name)
            .await?;

        for device in &owned {
            let device_name = device.metadata.name.as_deref().unwrap_or_default();
            info!(node = %node_name, device = %device_name, "Deleting device record of removed node");
            self.store.delete(&self.namespace, device_name).await?;
        }
        Ok(())
    }
}
