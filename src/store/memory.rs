//! In-memory device store
//!
//! A complete DeviceStore kept in process memory, with call counters and
//! failure injection. Backs the test suite and standalone (no cluster)
//! runs; the kube store is the production implementation.

use crate::crd::BlockDevice;
use crate::domain::ports::DeviceStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// DeviceStore backed by a namespace/name keyed map
#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: Mutex<BTreeMap<(String, String), BlockDevice>>,
    create_count: AtomicUsize,
    update_count: AtomicUsize,
    delete_count: AtomicUsize,
    fail_next_list: AtomicBool,
    fail_next_delete: AtomicBool,
}

impl MemoryDeviceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create calls
    pub fn create_calls(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    /// Number of successful update calls
    pub fn update_calls(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    /// Number of successful delete calls
    pub fn delete_calls(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Make the next list call fail once
    pub fn fail_next_list(&self) {
        self.fail_next_list.store(true, Ordering::SeqCst);
    }

    /// Make the next delete call fail once
    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    fn check_list_failure(&self) -> Result<()> {
        if self.fail_next_list.swap(false, Ordering::SeqCst) {
            return Err(Error::Internal("injected list failure".into()));
        }
        Ok(())
    }

    fn key(device: &BlockDevice) -> (String, String) {
        (
            device.metadata.namespace.clone().unwrap_or_default(),
            device.metadata.name.clone().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn list_all(&self, namespace: &str) -> Result<Vec<BlockDevice>> {
        self.check_list_failure()?;
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, bd)| bd.clone())
            .collect())
    }

    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<BlockDevice>> {
        self.check_list_failure()?;
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter(|(_, bd)| {
                bd.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(key))
                    .map(|v| v == value)
                    .unwrap_or(false)
            })
            .map(|(_, bd)| bd.clone())
            .collect())
    }

    async fn create(&self, device: &BlockDevice) -> Result<BlockDevice> {
        let key = Self::key(device);
        let mut devices = self.devices.lock();
        if devices.contains_key(&key) {
            return Err(Error::ResourceExists {
                kind: "BlockDevice".into(),
                name: key.1,
            });
        }
        devices.insert(key, device.clone());
        self.create_count.fetch_add(1, Ordering::SeqCst);
        Ok(device.clone())
    }

    async fn update(&self, device: &BlockDevice) -> Result<BlockDevice> {
        let key = Self::key(device);
        let mut devices = self.devices.lock();
        if !devices.contains_key(&key) {
            return Err(Error::ResourceNotFound {
                kind: "BlockDevice".into(),
                name: key.1,
            });
        }
        devices.insert(key, device.clone());
        self.update_count.fetch_add(1, Ordering::SeqCst);
        Ok(device.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(Error::Internal("injected delete failure".into()));
        }
        let removed = self
            .devices
            .lock()
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_some() {
            self.delete_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::BlockDeviceSpec;
    use assert_matches::assert_matches;

    fn device(namespace: &str, name: &str) -> BlockDevice {
        let mut bd = BlockDevice::new(
            name,
            BlockDeviceSpec {
                node_name: "node-1".into(),
                dev_path: format!("/dev/{}", name),
                file_system: Default::default(),
            },
        );
        bd.metadata.namespace = Some(namespace.to_string());
        bd
    }

    #[tokio::test]
    async fn test_create_then_list_scoped_by_namespace() {
        let store = MemoryDeviceStore::new();
        store.create(&device("a", "node-1-sda")).await.unwrap();
        store.create(&device("b", "node-1-sdb")).await.unwrap();

        assert_eq!(store.list_all("a").await.unwrap().len(), 1);
        assert_eq!(store.list_all("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryDeviceStore::new();
        store.create(&device("ns", "node-1-sda")).await.unwrap();
        let err = store.create(&device("ns", "node-1-sda")).await.unwrap_err();
        assert_matches!(err, Error::ResourceExists { .. });
    }

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let store = MemoryDeviceStore::new();
        let err = store.update(&device("ns", "node-1-sda")).await.unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryDeviceStore::new();
        store.create(&device("ns", "node-1-sda")).await.unwrap();
        store.delete("ns", "node-1-sda").await.unwrap();
        store.delete("ns", "node-1-sda").await.unwrap();
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_list_failure_fires_once() {
        let store = MemoryDeviceStore::new();
        store.fail_next_list();
        assert!(store.list_all("ns").await.is_err());
        assert!(store.list_all("ns").await.is_ok());
    }
}
