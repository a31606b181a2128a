//! Worker pool fingerprints
//!
//! A fingerprint summarizes every setting of a worker pool whose change needs
//! an in-place node update. The worker actuator records the fingerprint of the
//! configuration it applied per pool; comparing it against a freshly computed
//! one tells whether a pool has drifted.

use aws_lc_rs::digest;
use serde::Serialize;

use lattice_common::crd::{ClusterCredentials, KubeletConfig, LatticeCluster, WorkerPoolSpec};
use lattice_common::Error;

/// Update-relevant configuration of one pool, with pool overrides applied
#[derive(Clone, Debug, PartialEq)]
pub struct EffectivePoolConfig<'a> {
    /// Pool name
    pub pool_name: &'a str,
    /// Pool Kubernetes version, else the cluster version
    pub kubernetes_version: &'a str,
    /// Pool kubelet configuration, else the cluster kubelet configuration
    pub kubelet: Option<&'a KubeletConfig>,
    /// Machine image version; empty when unset
    pub machine_image_version: &'a str,
    /// Cluster credential rotation state
    pub credentials: Option<&'a ClusterCredentials>,
}

impl<'a> EffectivePoolConfig<'a> {
    /// Resolve the effective configuration of `pool` within `cluster`
    pub fn resolve(cluster: &'a LatticeCluster, pool: &'a WorkerPoolSpec) -> Self {
        let overrides = pool.kubernetes.as_ref();
        Self {
            pool_name: &pool.name,
            kubernetes_version: overrides
                .and_then(|k| k.version.as_deref())
                .unwrap_or(cluster.spec.kubernetes.version.as_str()),
            kubelet: overrides
                .and_then(|k| k.kubelet.as_ref())
                .or(cluster.spec.kubernetes.kubelet.as_ref()),
            machine_image_version: pool.machine.image.version.as_deref().unwrap_or_default(),
            credentials: cluster.status.as_ref().and_then(|s| s.credentials.as_ref()),
        }
    }

    /// Fingerprint of this configuration
    pub fn fingerprint(&self) -> Result<String, Error> {
        fingerprint(
            self.pool_name,
            self.kubernetes_version,
            self.kubelet,
            self.machine_image_version,
            self.credentials,
        )
    }
}

// Field order is part of the fingerprint; append new fields at the end only.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    pool_name: &'a str,
    kubernetes_version: &'a str,
    kubelet: Option<&'a KubeletConfig>,
    machine_image_version: &'a str,
    credentials: Option<&'a ClusterCredentials>,
}

/// Compute the fingerprint of a pool's update-relevant configuration
///
/// The inputs are serialized to JSON (struct fields in a fixed order, maps
/// ordered by key) and hashed with SHA-256. The result is the lowercase hex
/// digest, stable across processes and platforms.
pub fn fingerprint(
    pool_name: &str,
    kubernetes_version: &str,
    kubelet: Option<&KubeletConfig>,
    machine_image_version: &str,
    credentials: Option<&ClusterCredentials>,
) -> Result<String, Error> {
    let input = FingerprintInput {
        pool_name,
        kubernetes_version,
        kubelet,
        machine_image_version,
        credentials,
    };
    let canonical = serde_json::to_vec(&input).map_err(|e| {
        Error::serialization_for_kind("WorkerPool", format!("pool {}: {}", pool_name, e))
    })?;

    let hash = digest::digest(&digest::SHA256, &canonical);
    Ok(hex(hash.as_ref()))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}
