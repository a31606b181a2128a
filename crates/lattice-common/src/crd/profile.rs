//! ClusterProfile Custom Resource Definition
//!
//! A ClusterProfile is a shared catalog of the Kubernetes and machine image
//! versions a cell offers. Clusters reference it by name.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a ClusterProfile
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "ClusterProfile",
    plural = "clusterprofiles",
    shortname = "cprof",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProfileSpec {
    /// Offered Kubernetes versions
    #[serde(default)]
    pub kubernetes_versions: Vec<String>,

    /// Offered machine images
    #[serde(default)]
    pub machine_images: Vec<MachineImageOffer>,
}

/// A machine image and the versions offered for it
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineImageOffer {
    /// Image name
    pub name: String,

    /// Offered versions, newest last
    #[serde(default)]
    pub versions: Vec<String>,
}
