//! Node CRD
//!
//! Represents a node's participation in the storage cluster. The agent only
//! consumes it as a deletion-event source: removal of a Node triggers
//! cascade cleanup of every BlockDevice record that node owns.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Node participation record; owned by the cluster manager, watched here
/// solely for removal events.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "longhorn.io",
    version = "v1beta1",
    kind = "Node",
    plural = "nodes",
    status = "NodeStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Whether the node accepts new storage scheduling
    #[serde(default)]
    pub allow_scheduling: bool,
}

/// Status of the Node; opaque to this agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Free-form readiness marker maintained by the cluster manager
    #[serde(default)]
    pub ready: bool,
}
