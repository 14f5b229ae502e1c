//! Kubernetes-backed device store
//!
//! DeviceStore implementation over the BlockDevice custom resource API.
//! List operations translate label filters to server-side selectors so
//! cascade fan-outs stay cheap on nodes with many partitions.

use crate::crd::BlockDevice;
use crate::domain::ports::DeviceStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

pub struct KubeDeviceStore {
    client: Client,
}

impl KubeDeviceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<BlockDevice> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl DeviceStore for KubeDeviceStore {
    async fn list_all(&self, namespace: &str) -> Result<Vec<BlockDevice>> {
        let list = self.api(namespace).list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<BlockDevice>> {
        let params = ListParams::default().labels(&format!("{}={}", key, value));
        let list = self.api(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, device: &BlockDevice) -> Result<BlockDevice> {
        let namespace = device.metadata.namespace.clone().unwrap_or_default();
        let created = self
            .api(&namespace)
            .create(&PostParams::default(), device)
            .await?;
        Ok(created)
    }

    async fn update(&self, device: &BlockDevice) -> Result<BlockDevice> {
        let namespace = device.metadata.namespace.clone().unwrap_or_default();
        let name = device
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Configuration("block device has no name".into()))?;
        let updated = self
            .api(&namespace)
            .replace(&name, &PostParams::default(), device)
            .await?;
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            // already gone, treat as success
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }
}
