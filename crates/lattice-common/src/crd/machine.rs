//! NodeGroup and Machine Custom Resource Definitions
//!
//! NodeGroups and Machines live in a cluster's control-plane namespace and are
//! owned by the machine controller. A Machine names its NodeGroup through the
//! [`NODE_GROUP_LABEL`] label and reports in-place update progress through a
//! condition of type [`IN_PLACE_UPDATE_CONDITION`].

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label on a Machine naming the NodeGroup that owns it
pub const NODE_GROUP_LABEL: &str = "lattice.dev/node-group";

/// Condition type reporting in-place update progress on a Machine
pub const IN_PLACE_UPDATE_CONDITION: &str = "InPlaceUpdate";

/// Specification for a NodeGroup
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "NodeGroup",
    plural = "nodegroups",
    shortname = "ng",
    namespaced,
    printcolumn = r#"{"name":"Strategy","type":"string","jsonPath":".spec.strategy.type"}"#,
    printcolumn = r#"{"name":"Orchestration","type":"string","jsonPath":".spec.strategy.orchestrationType"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    /// Desired number of machines
    #[serde(default)]
    pub replicas: u32,

    /// How machines of this group are updated
    #[serde(default)]
    pub strategy: NodeGroupStrategy,
}

/// Update strategy shared by all machines of a NodeGroup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupStrategy {
    /// Replace machines or update them in place
    #[serde(rename = "type", default)]
    pub type_: StrategyType,

    /// Who starts the update of each machine
    #[serde(default)]
    pub orchestration_type: OrchestrationType,
}

impl NodeGroupStrategy {
    /// True for in-place updates that wait for an operator to select machines
    pub fn is_manual_in_place(&self) -> bool {
        self.type_ == StrategyType::InPlaceUpdate
            && self.orchestration_type == OrchestrationType::Manual
    }
}

/// Machine replacement strategy
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StrategyType {
    /// Replace machines one batch at a time
    #[default]
    RollingUpdate,
    /// Update machines without replacing them
    InPlaceUpdate,
}

/// Who drives the update of each machine
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum OrchestrationType {
    /// The machine controller picks machines on its own
    #[default]
    Auto,
    /// An operator selects machines explicitly
    Manual,
}

/// Specification for a Machine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "Machine",
    plural = "machines",
    shortname = "mach",
    status = "MachineStatus",
    namespaced,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".spec.nodeName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineObjectSpec {
    /// Name of the Kubernetes node backing this machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    /// Provider-specific machine identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Status for a Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<MachineCondition>,
}

/// A typed, reasoned status entry of a Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineCondition {
    /// Condition type (e.g., InPlaceUpdate, Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    #[serde(default)]
    pub status: String,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Machine {
    /// Name of the owning NodeGroup, from the node-group label
    pub fn node_group_name(&self) -> Option<&str> {
        self.labels().get(NODE_GROUP_LABEL).map(String::as_str)
    }

    /// The condition of the given type, if reported
    pub fn condition(&self, type_: &str) -> Option<&MachineCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == type_))
    }
}
