//! In-place update status controller
//!
//! Keeps `status.inPlaceUpdates.pendingWorkerUpdates.manualInPlaceUpdate` of a
//! LatticeCluster equal to the set of manual in-place pools whose configuration
//! differs from what the worker actuator last applied, and clears the
//! `force-in-place-update` operation once nothing is pending anymore.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use lattice_common::backoff::FailureTracker;
use lattice_common::crd::{
    InPlaceUpdatesStatus, LatticeCluster, PendingWorkerUpdates, Worker, OPERATION_ANNOTATION,
};
use lattice_common::kube_utils::{remove_annotation_patch, with_resource_version};
use lattice_common::{Error, FIELD_MANAGER};

use crate::config::InPlaceStatusConfig;
use crate::drift::pending_manual_updates;

/// Trait abstracting the Kubernetes reads and writes of the status controller
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a LatticeCluster, `None` if it does not exist
    async fn get_cluster(&self, namespace: &str, name: &str)
        -> Result<Option<LatticeCluster>, Error>;

    /// Fetch a Worker, `None` if it does not exist
    async fn get_worker(&self, namespace: &str, name: &str) -> Result<Option<Worker>, Error>;

    /// Merge-patch the status subresource of a LatticeCluster
    ///
    /// Returns the resource version of the patched object.
    async fn patch_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Option<String>, Error>;

    /// Merge-patch the main resource (metadata) of a LatticeCluster
    async fn patch_cluster(&self, namespace: &str, name: &str, patch: &Value)
        -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LatticeCluster>, Error> {
        let api: Api<LatticeCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_worker(&self, namespace: &str, name: &str) -> Result<Option<Worker>, Error> {
        let api: Api<Worker> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Option<String>, Error> {
        let api: Api<LatticeCluster> = Api::namespaced(self.client.clone(), namespace);
        let patched = api
            .patch_status(name, &Self::patch_params(), &Patch::Merge(patch))
            .await?;
        Ok(patched.resource_version())
    }

    async fn patch_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), Error> {
        let api: Api<LatticeCluster> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &Self::patch_params(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}

/// Shared context for the in-place status controller
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Controller settings
    pub config: InPlaceStatusConfig,
    /// Consecutive failures per cluster, for the error policy
    pub failures: FailureTracker,
}

impl Context {
    /// Create a context around an existing client implementation
    pub fn new(kube: Arc<dyn KubeClient>, config: InPlaceStatusConfig) -> Self {
        let failures = FailureTracker::new(config.backoff.clone());
        Self {
            kube,
            config,
            failures,
        }
    }

    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: InPlaceStatusConfig) -> ContextBuilder {
        ContextBuilder {
            client,
            config,
            kube: None,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    config: InPlaceStatusConfig,
    kube: Option<Arc<dyn KubeClient>>,
}

impl ContextBuilder {
    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube = self
            .kube
            .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client)));
        Context::new(kube, self.config)
    }
}

/// What a reconciliation did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cluster no longer exists
    ClusterGone,
    /// The cluster is being deleted
    ClusterDeleting,
    /// The cluster belongs to another cell
    NotOwned,
    /// The cluster has no Worker yet
    WorkerMissing,
    /// The actuator has not recorded any pool fingerprints yet
    WorkerNotReconciled,
    /// No manual in-place update is recorded, so there is nothing to resolve
    NothingPending,
    /// An interrupted earlier attempt left the force operation behind; it was removed
    StaleOperationRemoved,
    /// The recorded pending pools already match the drift
    UpToDate,
    /// The recorded pending pools were replaced
    Updated {
        /// Pools now waiting for a manual in-place update
        pending: Vec<String>,
        /// The force operation annotation was removed afterwards
        operation_removed: bool,
    },
}

/// Reconcile the manual in-place pending pools of a LatticeCluster
///
/// The cluster passed in only identifies the object; every decision is made
/// on a fresh read. Each attempt is bounded by the configured reconcile
/// timeout.
#[instrument(
    skip(cluster, ctx),
    fields(cluster = %cluster.name_any(), namespace = %cluster.namespace().unwrap_or_default())
)]
pub async fn reconcile(cluster: Arc<LatticeCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    let key = object_key(&namespace, &name);

    let timeout = ctx.config.reconcile_timeout;
    let outcome = tokio::time::timeout(timeout, sync_pending_updates(&ctx, &namespace, &name))
        .await
        .map_err(|_| Error::timeout(format!("reconcile cluster {}", key), timeout))??;

    ctx.failures.reset(&key);
    debug!(?outcome, "reconciled in-place update status");
    Ok(Action::await_change())
}

/// Requeue a failed cluster with per-cluster exponential backoff
pub fn error_policy(cluster: Arc<LatticeCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&cluster.namespace().unwrap_or_default(), &cluster.name_any());
    let delay = ctx.failures.record_failure(&key);

    if error.is_conflict() {
        debug!(cluster = %key, delay_ms = delay.as_millis(), "cluster changed during reconciliation, retrying");
    } else {
        error!(
            ?error,
            cluster = %key,
            failures = ctx.failures.failures(&key),
            delay_ms = delay.as_millis(),
            "reconciliation failed"
        );
    }
    Action::requeue(delay)
}

/// Recompute and persist the manual in-place pending pools of one cluster
pub async fn sync_pending_updates(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<SyncOutcome, Error> {
    let Some(cluster) = ctx.kube.get_cluster(namespace, name).await? else {
        debug!("cluster is gone, nothing to update");
        return Ok(SyncOutcome::ClusterGone);
    };
    if cluster.metadata.deletion_timestamp.is_some() {
        return Ok(SyncOutcome::ClusterDeleting);
    }
    if !cluster.is_managed_by(&ctx.config.cell_name) {
        return Ok(SyncOutcome::NotOwned);
    }

    let worker_namespace = cluster.control_plane_namespace();
    let Some(worker) = ctx.kube.get_worker(&worker_namespace, name).await? else {
        debug!(worker_namespace = %worker_namespace, "worker is gone, nothing to update");
        return Ok(SyncOutcome::WorkerMissing);
    };
    let Some(applied) = worker.pool_hashes() else {
        return Ok(SyncOutcome::WorkerNotReconciled);
    };

    let recorded = cluster.manual_in_place_pending();
    if recorded.is_empty() {
        if in_place_status(&cluster).is_none() && cluster.has_force_in_place_update() {
            remove_force_operation(ctx, &cluster, cluster.resource_version().as_deref()).await?;
            return Ok(SyncOutcome::StaleOperationRemoved);
        }
        return Ok(SyncOutcome::NothingPending);
    }

    let pending = pending_manual_updates(&cluster, applied)?;
    if same_pools(recorded, &pending) {
        info!("manual in-place pending workers are already up-to-date");
        return Ok(SyncOutcome::UpToDate);
    }

    let updated = with_manual_pending(in_place_status(&cluster), pending.clone());
    let patch = status_patch(updated.as_ref(), cluster.resource_version().as_deref());

    info!(pending = ?pending, "updating manual in-place pending workers");
    let resource_version = ctx
        .kube
        .patch_cluster_status(namespace, name, &patch)
        .await?;

    let operation_removed = updated.is_none() && cluster.has_force_in_place_update();
    if operation_removed {
        remove_force_operation(ctx, &cluster, resource_version.as_deref()).await?;
    }

    Ok(SyncOutcome::Updated {
        pending,
        operation_removed,
    })
}

async fn remove_force_operation(
    ctx: &Context,
    cluster: &LatticeCluster,
    resource_version: Option<&str>,
) -> Result<(), Error> {
    let patch = remove_annotation_patch(OPERATION_ANNOTATION, resource_version);
    ctx.kube
        .patch_cluster(
            &cluster.namespace().unwrap_or_default(),
            &cluster.name_any(),
            &patch,
        )
        .await
        .inspect_err(|e| warn!(error = %e, "failed to remove force-in-place-update operation"))?;
    info!("removed force-in-place-update operation");
    Ok(())
}

fn in_place_status(cluster: &LatticeCluster) -> Option<&InPlaceUpdatesStatus> {
    cluster
        .status
        .as_ref()
        .and_then(|s| s.in_place_updates.as_ref())
}

fn same_pools(recorded: &[String], pending: &[String]) -> bool {
    let recorded: BTreeSet<&str> = recorded.iter().map(String::as_str).collect();
    let pending: BTreeSet<&str> = pending.iter().map(String::as_str).collect();
    recorded == pending
}

/// Replace the manual pending pools and collapse every level left empty
///
/// The automatic pending pools are carried over untouched, except that an
/// empty list is dropped.
pub fn with_manual_pending(
    current: Option<&InPlaceUpdatesStatus>,
    manual: Vec<String>,
) -> Option<InPlaceUpdatesStatus> {
    let auto = current
        .and_then(|s| s.pending_worker_updates.as_ref())
        .and_then(|p| p.auto_in_place_update.clone())
        .filter(|pools| !pools.is_empty());
    let manual = Some(manual).filter(|pools| !pools.is_empty());

    if manual.is_none() && auto.is_none() {
        return None;
    }
    Some(InPlaceUpdatesStatus {
        pending_worker_updates: Some(PendingWorkerUpdates {
            manual_in_place_update: manual,
            auto_in_place_update: auto,
        }),
    })
}

/// Minimal status merge patch for a normalized in-place update status
///
/// Only `manualInPlaceUpdate` is named unless a whole level collapsed, in
/// which case the collapsed level is nulled instead.
pub fn status_patch(updated: Option<&InPlaceUpdatesStatus>, resource_version: Option<&str>) -> Value {
    let in_place = match updated.and_then(|s| s.pending_worker_updates.as_ref()) {
        None => Value::Null,
        Some(pending) => json!({
            "pendingWorkerUpdates": {
                "manualInPlaceUpdate": pending.manual_in_place_update,
            }
        }),
    };
    with_resource_version(
        json!({ "status": { "inPlaceUpdates": in_place } }),
        resource_version,
    )
}

fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}
