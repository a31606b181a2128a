//! LatticeCluster Custom Resource Definition
//!
//! A LatticeCluster is a workload cluster managed by a cell. Its worker pools
//! are provisioned by an external actuator; this crate only models the fields
//! the in-place update machinery reads and writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation carrying one-shot operations requested by a user
pub const OPERATION_ANNOTATION: &str = "lattice.dev/operation";

/// Operation value forcing pending manual in-place updates to be applied
pub const OPERATION_FORCE_IN_PLACE_UPDATE: &str = "force-in-place-update";

/// Prefix for derived control-plane namespaces (`cp--<namespace>--<name>`)
pub const CONTROL_PLANE_NAMESPACE_PREFIX: &str = "cp--";

/// Specification for a LatticeCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "LatticeCluster",
    plural = "latticeclusters",
    shortname = "lc",
    status = "LatticeClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Cell","type":"string","jsonPath":".spec.cellRef"}"#,
    printcolumn = r#"{"name":"K8s","type":"string","jsonPath":".spec.kubernetes.version"}"#,
    printcolumn = r#"{"name":"Manual Pending","type":"string","jsonPath":".status.inPlaceUpdates.pendingWorkerUpdates.manualInPlaceUpdate"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LatticeClusterSpec {
    /// Name of the cell responsible for this cluster
    ///
    /// Only the operator running with a matching `--cell-name` reconciles it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_ref: Option<String>,

    /// Cluster-wide Kubernetes defaults
    pub kubernetes: KubernetesSpec,

    /// Worker pools, in declaration order
    #[serde(default)]
    pub workers: Vec<WorkerPoolSpec>,

    /// Optional shared ClusterProfile this cluster draws its versions from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_ref: Option<String>,
}

/// Kubernetes version and kubelet defaults for the whole cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSpec {
    /// Kubernetes version (e.g., "1.32.0")
    pub version: String,

    /// Kubelet configuration applied to every pool without its own override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfig>,
}

/// Kubelet settings that require a node update when changed
///
/// All maps are ordered so that serialization, and therefore fingerprints,
/// never depend on insertion order.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    /// CPU manager policy (none, static)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_manager_policy: Option<String>,

    /// Hard eviction thresholds (e.g., memory.available -> 100Mi)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub eviction_hard: BTreeMap<String, String>,

    /// Resources reserved for Kubernetes system daemons
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kube_reserved: BTreeMap<String, String>,

    /// Resources reserved for OS system daemons
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub system_reserved: BTreeMap<String, String>,

    /// Maximum number of pods per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<i32>,
}

/// How changes to a worker pool are rolled out
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Replace machines with new ones (default)
    #[default]
    AutoRollingUpdate,
    /// Update machines in place without operator intervention
    AutoInPlaceUpdate,
    /// Update machines in place only after an explicit operator trigger
    ManualInPlaceUpdate,
}

impl UpdateStrategy {
    /// True for the human-gated in-place strategy
    pub fn is_manual_in_place(self) -> bool {
        self == UpdateStrategy::ManualInPlaceUpdate
    }
}

/// A named, homogeneously configured group of worker machines
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolSpec {
    /// Pool name, unique within the cluster
    pub name: String,

    /// Rollout strategy for configuration changes
    #[serde(default)]
    pub update_strategy: UpdateStrategy,

    /// Per-pool Kubernetes overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<WorkerKubernetes>,

    /// Machine type and image
    pub machine: MachineSpec,

    /// Minimum number of machines
    #[serde(default)]
    pub minimum: u32,

    /// Maximum number of machines
    #[serde(default)]
    pub maximum: u32,
}

/// Pool-level overrides of the cluster Kubernetes defaults
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerKubernetes {
    /// Kubernetes version for this pool (wins over the cluster version)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Kubelet configuration for this pool (wins over the cluster kubelet)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfig>,
}

/// Machine shape of a worker pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Provider machine type (e.g., "m5.large")
    #[serde(rename = "type")]
    pub type_: String,

    /// Operating system image
    pub image: MachineImage,
}

/// Operating system image of a worker pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineImage {
    /// Image name (e.g., "flatcar")
    pub name: String,

    /// Image version; unset means the profile default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Status for a LatticeCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatticeClusterStatus {
    /// Unique technical identifier; also the name of the control-plane namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_id: Option<String>,

    /// Credential rotation state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ClusterCredentials>,

    /// Worker pools with pending in-place updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_place_updates: Option<InPlaceUpdatesStatus>,
}

/// Credential state that forces an in-place node update when it changes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCredentials {
    /// Rotation progress per credential kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<CredentialsRotation>,
}

/// Rotation progress of cluster credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRotation {
    /// Cluster certificate authorities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authorities: Option<RotationStatus>,

    /// Service account signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_key: Option<RotationStatus>,
}

/// Progress of one credential rotation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RotationStatus {
    /// Rotation phase (Preparing, Prepared, Completing, Completed)
    pub phase: String,

    /// When the most recent rotation was started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_initiation_time: Option<DateTime<Utc>>,

    /// When the most recent rotation finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completion_time: Option<DateTime<Utc>>,
}

/// In-place update bookkeeping on the cluster status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InPlaceUpdatesStatus {
    /// Pools waiting for an in-place update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_worker_updates: Option<PendingWorkerUpdates>,
}

/// Pool names waiting for an in-place update, split by strategy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingWorkerUpdates {
    /// Pools using ManualInPlaceUpdate whose configuration drifted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_in_place_update: Option<Vec<String>>,

    /// Pools using AutoInPlaceUpdate (owned by the cluster reconciler)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_in_place_update: Option<Vec<String>>,
}

impl LatticeCluster {
    /// Namespace holding this cluster's Worker, NodeGroups and Machines
    pub fn control_plane_namespace(&self) -> String {
        if let Some(id) = self.status.as_ref().and_then(|s| s.technical_id.as_deref()) {
            return id.to_string();
        }
        format!(
            "{}{}--{}",
            CONTROL_PLANE_NAMESPACE_PREFIX,
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// True if this cluster is reconciled by the named cell
    pub fn is_managed_by(&self, cell_name: &str) -> bool {
        self.spec.cell_ref.as_deref() == Some(cell_name)
    }

    /// Pools currently recorded as waiting for a manual in-place update
    pub fn manual_in_place_pending(&self) -> &[String] {
        self.status
            .as_ref()
            .and_then(|s| s.in_place_updates.as_ref())
            .and_then(|u| u.pending_worker_updates.as_ref())
            .and_then(|p| p.manual_in_place_update.as_deref())
            .unwrap_or_default()
    }

    /// True if the force-in-place-update operation annotation is set
    pub fn has_force_in_place_update(&self) -> bool {
        self.annotations()
            .get(OPERATION_ANNOTATION)
            .is_some_and(|op| op == OPERATION_FORCE_IN_PLACE_UPDATE)
    }
}
