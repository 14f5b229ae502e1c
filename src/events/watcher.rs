//! Device Event Watcher
//!
//! Consumes live hardware add/remove notifications and applies the same
//! add-or-skip logic as the bulk registrar, scoped to a single device.
//! The listening loop is entered exactly once per watcher instance and
//! blocks on the event channel, the error channel, and cancellation.

use crate::controller::DeviceRegistrar;
use crate::crd::{BlockDevice, BlockDeviceState, HOSTNAME_LABEL, PARENT_DEVICE_LABEL};
use crate::domain::ports::{DeviceStore, HardwareProbe};
use crate::error::{Error, Result};
use crate::events::device::{DeviceEvent, EventAction};
use crate::topology::{block_device_name, is_self_managed};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Backoff settings for transient list failures on the event path
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// First retry delay
    pub initial_backoff: Duration,
    /// Ceiling for the doubling retry delay
    pub max_backoff: Duration,
    /// Give up on one notification after this much total retrying
    pub max_elapsed: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Incremental, single-device counterpart of the bulk registrar.
pub struct DeviceEventWatcher {
    namespace: String,
    node_name: String,
    store: Arc<dyn DeviceStore>,
    probe: Arc<dyn HardwareProbe>,
    registrar: Arc<DeviceRegistrar>,
    config: WatcherConfig,
    started: AtomicBool,
}

impl DeviceEventWatcher {
    /// Create a new event watcher
    pub fn new(
        namespace: impl Into<String>,
        node_name: impl Into<String>,
        store: Arc<dyn DeviceStore>,
        probe: Arc<dyn HardwareProbe>,
        registrar: Arc<DeviceRegistrar>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            node_name: node_name.into(),
            store,
            probe,
            registrar,
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Whether the listening loop has been entered
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run the listening loop until cancellation or channel closure.
    /// Entered at most once per watcher instance; later calls return
    /// immediately.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<DeviceEvent>,
        mut errors: mpsc::Receiver<Error>,
        cancel: CancellationToken,
    ) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Device event watcher already started; ignoring second start");
            return;
        }

        info!("Start monitoring device events");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Device event watcher stopped");
                    return;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            error!(error = %e, "Failed to handle device event");
                        }
                    }
                    None => {
                        warn!("Device event channel closed");
                        return;
                    }
                },
                err = errors.recv() => match err {
                    Some(e) => error!(error = %e, "Failed to parse device event"),
                    None => {
                        warn!("Device event error channel closed");
                        return;
                    }
                },
            }
        }
    }

    /// Dispatch one notification. Only whole disks are handled; partitions
    /// ride along with their parent, and self-managed volumes are ignored.
    pub async fn handle_event(&self, event: &DeviceEvent) -> Result<()> {
        if is_self_managed(event.attributes.id_path()) {
            return Ok(());
        }
        if !event.attributes.is_disk() {
            return Ok(());
        }

        match event.action {
            EventAction::Add => self.handle_add(event.attributes.short_name()).await,
            EventAction::Remove => self.handle_remove(event.attributes.short_name()).await,
        }
    }

    /// Add path: skip when the record already exists, otherwise probe the
    /// single disk and persist its topology through the registrar's save
    /// path. List failures retry with capped exponential backoff.
    async fn handle_add(&self, short_name: &str) -> Result<()> {
        let name = block_device_name(short_name, &self.node_name);

        let policy = backoff::ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            max_elapsed_time: Some(self.config.max_elapsed),
            ..Default::default()
        };
        let existing = backoff::future::retry(policy, || async {
            self.store
                .list_by_label(&self.namespace, HOSTNAME_LABEL, &self.node_name)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Failed to list block devices for add event, retrying");
                    backoff::Error::transient(e)
                })
        })
        .await?;

        if existing
            .iter()
            .any(|bd| bd.metadata.name.as_deref() == Some(name.as_str()))
        {
            debug!(device = %name, "Block device already registered");
            return Ok(());
        }

        let disk = self
            .probe
            .get_disk(short_name)
            .await?
            .ok_or_else(|| Error::DeviceNotFound {
                device: short_name.to_string(),
            })?;
        if is_self_managed(&disk.bus_path) {
            return Ok(());
        }

        info!(device = %name, "Registering hotplugged block device");
        let records =
            crate::topology::build_device_records(&disk, &self.node_name, &self.namespace);
        for record in &records {
            self.registrar.save_device(record, &existing).await?;
        }
        Ok(())
    }

    /// Remove path: transition the record and its partition records to
    /// Detached instead of deleting, so a re-attached device reuses its
    /// history.
    async fn handle_remove(&self, short_name: &str) -> Result<()> {
        let name = block_device_name(short_name, &self.node_name);

        let owned = self
            .store
            .list_by_label(&self.namespace, HOSTNAME_LABEL, &self.node_name)
            .await?;
        let Some(record) = owned
            .iter()
            .find(|bd| bd.metadata.name.as_deref() == Some(name.as_str()))
        else {
            debug!(device = %name, "Remove event for unknown block device");
            return Ok(());
        };

        info!(device = %name, "Marking removed block device as detached");
        self.detach(record).await?;

        let children = self
            .store
            .list_by_label(&self.namespace, PARENT_DEVICE_LABEL, &name)
            .await?;
        for child in &children {
            self.detach(child).await?;
        }
        Ok(())
    }

    async fn detach(&self, device: &BlockDevice) -> Result<()> {
        let already_detached = device
            .status
            .as_ref()
            .map(|s| s.state == BlockDeviceState::Detached)
            .unwrap_or(false);
        if already_detached {
            return Ok(());
        }

        let mut detached = device.clone();
        detached
            .status
            .get_or_insert_with(Default::default)
            .state = BlockDeviceState::Detached;
        self.store.update(&detached).await?;
        Ok(())
    }
}
