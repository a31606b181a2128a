//! Custom Resource Definitions for Lattice
//!
//! This module contains the CRDs the in-place update operator reads and writes.

mod cluster;
mod machine;
mod profile;
mod worker;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub use cluster::{
    ClusterCredentials, CredentialsRotation, InPlaceUpdatesStatus, KubeletConfig, KubernetesSpec,
    LatticeCluster, LatticeClusterSpec, LatticeClusterStatus, MachineImage, MachineSpec,
    PendingWorkerUpdates, RotationStatus, UpdateStrategy, WorkerKubernetes, WorkerPoolSpec,
    CONTROL_PLANE_NAMESPACE_PREFIX, OPERATION_ANNOTATION, OPERATION_FORCE_IN_PLACE_UPDATE,
};
pub use machine::{
    Machine, MachineCondition, MachineObjectSpec, MachineStatus, NodeGroup, NodeGroupSpec,
    NodeGroupStrategy, OrchestrationType, StrategyType, IN_PLACE_UPDATE_CONDITION,
    NODE_GROUP_LABEL,
};
pub use profile::{ClusterProfile, ClusterProfileSpec, MachineImageOffer};
pub use worker::{Worker, WorkerInPlaceUpdates, WorkerSpec, WorkerStatus};

/// Every CRD served by the operator, in installation order
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        LatticeCluster::crd(),
        Worker::crd(),
        NodeGroup::crd(),
        Machine::crd(),
        ClusterProfile::crd(),
    ]
}
