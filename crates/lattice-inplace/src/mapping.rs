//! Mapping of related objects to the LatticeClusters they affect

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use lattice_common::crd::{ClusterProfile, LatticeCluster, Machine, Worker};

/// Clusters whose Worker is `worker`: same control-plane namespace and name
pub fn clusters_for_worker(
    clusters: impl IntoIterator<Item = Arc<LatticeCluster>>,
    worker: &Worker,
) -> Vec<ObjectRef<LatticeCluster>> {
    let namespace = worker.namespace().unwrap_or_default();
    let name = worker.name_any();
    clusters
        .into_iter()
        .filter(|c| c.name_any() == name && c.control_plane_namespace() == namespace)
        .map(|c| ObjectRef::from_obj(c.as_ref()))
        .collect()
}

/// Clusters whose control-plane namespace holds `machine`
pub fn clusters_for_machine(
    clusters: impl IntoIterator<Item = Arc<LatticeCluster>>,
    machine: &Machine,
) -> Vec<ObjectRef<LatticeCluster>> {
    let namespace = machine.namespace().unwrap_or_default();
    clusters
        .into_iter()
        .filter(|c| c.control_plane_namespace() == namespace)
        .map(|c| ObjectRef::from_obj(c.as_ref()))
        .collect()
}

/// Clusters referencing `profile`
pub fn clusters_for_profile(
    clusters: impl IntoIterator<Item = Arc<LatticeCluster>>,
    profile: &ClusterProfile,
) -> Vec<ObjectRef<LatticeCluster>> {
    let name = profile.name_any();
    clusters
        .into_iter()
        .filter(|c| c.spec.profile_ref.as_deref() == Some(name.as_str()))
        .map(|c| ObjectRef::from_obj(c.as_ref()))
        .collect()
}
