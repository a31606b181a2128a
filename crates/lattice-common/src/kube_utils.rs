//! Kubernetes utilities: client construction, CRD installation and the
//! merge-patch bodies shared by controllers.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{Error, FIELD_MANAGER};

/// Default connection timeout for kube clients (5s is plenty for local API server)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Server-side apply the given CRDs, taking ownership of conflicting fields
pub async fn install_crds(client: &Client, crds: &[CustomResourceDefinition]) -> Result<(), Error> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in crds {
        let name = crd.metadata.name.as_deref().ok_or_else(|| {
            Error::validation_for_field("CustomResourceDefinition", "metadata.name", "missing")
        })?;
        api.patch(name, &params, &Patch::Apply(crd)).await?;
        info!(crd = %name, "Installed CRD");
    }
    Ok(())
}

/// Add `metadata.resourceVersion` to a merge-patch body
///
/// The API server rejects the patch with 409 Conflict if the object changed
/// since `resource_version` was read. With `None` the body is returned as is.
pub fn with_resource_version(mut patch: Value, resource_version: Option<&str>) -> Value {
    let Some(rv) = resource_version else {
        return patch;
    };
    if let Value::Object(root) = &mut patch {
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(meta) = metadata {
            meta.insert("resourceVersion".to_string(), json!(rv));
        }
    }
    patch
}

/// Merge patch that deletes a single annotation and nothing else
pub fn remove_annotation_patch(key: &str, resource_version: Option<&str>) -> Value {
    let mut annotations = Map::new();
    annotations.insert(key.to_string(), Value::Null);
    with_resource_version(
        json!({ "metadata": { "annotations": annotations } }),
        resource_version,
    )
}
