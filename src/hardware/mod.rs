//! Local hardware adapters: sysfs probing and mkfs/mount execution

pub mod fsops;
pub mod probe;

pub use fsops::SystemFilesystemOps;
pub use probe::{ProbeConfig, SysfsProbe};
