//! Identity Naming
//!
//! Record names are a pure function of node name and device short name, so
//! re-probing the same physical device always resolves to the same record.

/// Substring in a bus path that marks a volume exposed by this storage
/// system itself. Such devices are never registered (cycle avoidance).
const SELF_MANAGED_BUS_SUBSTRING: &str = "longhorn";

/// Derive the record name for a device on a node.
///
/// Stable across probe runs and process restarts; embeds no volatile
/// attributes.
pub fn block_device_name(device_name: &str, node_name: &str) -> String {
    format!("{}-{}", node_name, device_name)
}

/// Expand a short device name to its /dev path. Empty in, empty out.
pub fn full_dev_path(short_name: &str) -> String {
    if short_name.is_empty() {
        return String::new();
    }
    format!("/dev/{}", short_name)
}

/// Whether a bus path identifies a device this system exposes itself.
pub fn is_self_managed(bus_path: &str) -> bool {
    bus_path.contains(SELF_MANAGED_BUS_SUBSTRING)
}
