//! Worker Custom Resource Definition
//!
//! A Worker is written by the worker actuator in a cluster's control-plane
//! namespace. Its status records, per pool, the fingerprint of the
//! configuration the actuator last applied.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Worker
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "Worker",
    plural = "workers",
    status = "WorkerStatus",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Names of the pools the actuator manages
    #[serde(default)]
    pub pools: Vec<String>,
}

/// Status for a Worker
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    /// In-place update bookkeeping maintained by the actuator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_place_updates: Option<WorkerInPlaceUpdates>,
}

/// In-place update bookkeeping of a Worker
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInPlaceUpdates {
    /// Pool name to the fingerprint of the configuration last applied to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pool_to_hash_map: Option<BTreeMap<String, String>>,
}

impl Worker {
    /// Applied pool fingerprints, or None if the actuator has not recorded any yet
    pub fn pool_hashes(&self) -> Option<&BTreeMap<String, String>> {
        self.status
            .as_ref()
            .and_then(|s| s.in_place_updates.as_ref())
            .and_then(|u| u.worker_pool_to_hash_map.as_ref())
    }
}
