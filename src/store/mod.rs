//! Device record persistence backends

pub mod kube;
pub mod memory;

pub use kube::KubeDeviceStore;
pub use memory::MemoryDeviceStore;
