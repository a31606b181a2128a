//! End-to-end scenarios for manual in-place update tracking
//!
//! The reconciler runs against an in-memory API server that applies JSON
//! merge patches and enforces resource-version preconditions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::Value;

use lattice_common::crd::{
    InPlaceUpdatesStatus, KubernetesSpec, LatticeCluster, LatticeClusterSpec,
    LatticeClusterStatus, Machine, MachineCondition, MachineImage, MachineObjectSpec,
    MachineSpec, MachineStatus, NodeGroup, NodeGroupSpec, NodeGroupStrategy, OrchestrationType,
    PendingWorkerUpdates, StrategyType, UpdateStrategy, Worker, WorkerInPlaceUpdates,
    WorkerPoolSpec, WorkerSpec, WorkerStatus, IN_PLACE_UPDATE_CONDITION, NODE_GROUP_LABEL,
    OPERATION_ANNOTATION, OPERATION_FORCE_IN_PLACE_UPDATE,
};
use lattice_common::Error;
use lattice_inplace::controller::sync_pending_updates;
use lattice_inplace::hash::EffectivePoolConfig;
use lattice_inplace::{
    reconcile, Context, InPlaceStatusConfig, KubeClient, MachineEvent, NodeGroupResolver,
    SyncOutcome, TransitionFilter,
};

const CELL: &str = "cell-a";
const NAMESPACE: &str = "garden-team";
const CONTROL_PLANE: &str = "cp--garden-team--dev";

fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

/// RFC 7386 JSON merge patch
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[derive(Default)]
struct FakeApiServer {
    cluster: Mutex<Option<LatticeCluster>>,
    worker: Mutex<Option<Worker>>,
    status_patches: AtomicUsize,
    metadata_patches: AtomicUsize,
}

impl FakeApiServer {
    fn new(cluster: LatticeCluster, worker: Worker) -> Arc<Self> {
        Arc::new(Self {
            cluster: Mutex::new(Some(cluster)),
            worker: Mutex::new(Some(worker)),
            ..Default::default()
        })
    }

    fn cluster(&self) -> LatticeCluster {
        self.cluster.lock().unwrap().clone().unwrap()
    }

    fn writes(&self) -> (usize, usize) {
        (
            self.status_patches.load(Ordering::SeqCst),
            self.metadata_patches.load(Ordering::SeqCst),
        )
    }

    fn apply(&self, patch: &Value) -> Result<Option<String>, Error> {
        let mut guard = self.cluster.lock().unwrap();
        let Some(cluster) = guard.as_mut() else {
            return Err(api_error(404, "NotFound"));
        };

        let current = cluster.resource_version();
        if let Some(expected) = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
        {
            if current.as_deref() != Some(expected) {
                return Err(api_error(409, "Conflict"));
            }
        }

        let mut value = serde_json::to_value(&*cluster).unwrap();
        merge(&mut value, patch);
        let mut patched: LatticeCluster = serde_json::from_value(value).unwrap();
        let next: u64 = current.and_then(|rv| rv.parse().ok()).unwrap_or(0) + 1;
        patched.metadata.resource_version = Some(next.to_string());
        *cluster = patched;
        Ok(Some(next.to_string()))
    }
}

#[async_trait]
impl KubeClient for FakeApiServer {
    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LatticeCluster>, Error> {
        Ok(self
            .cluster
            .lock()
            .unwrap()
            .clone()
            .filter(|c| c.namespace().as_deref() == Some(namespace) && c.name_any() == name))
    }

    async fn get_worker(&self, namespace: &str, name: &str) -> Result<Option<Worker>, Error> {
        Ok(self
            .worker
            .lock()
            .unwrap()
            .clone()
            .filter(|w| w.namespace().as_deref() == Some(namespace) && w.name_any() == name))
    }

    async fn patch_cluster_status(
        &self,
        _namespace: &str,
        _name: &str,
        patch: &Value,
    ) -> Result<Option<String>, Error> {
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        self.apply(patch)
    }

    async fn patch_cluster(&self, _namespace: &str, _name: &str, patch: &Value) -> Result<(), Error> {
        self.metadata_patches.fetch_add(1, Ordering::SeqCst);
        self.apply(patch).map(|_| ())
    }
}

fn pool(name: &str, strategy: UpdateStrategy) -> WorkerPoolSpec {
    WorkerPoolSpec {
        name: name.to_string(),
        update_strategy: strategy,
        machine: MachineSpec {
            type_: "m5.large".to_string(),
            image: MachineImage {
                name: "flatcar".to_string(),
                version: Some("4081.2.0".to_string()),
            },
        },
        minimum: 1,
        maximum: 3,
        ..Default::default()
    }
}

fn cluster(pools: Vec<WorkerPoolSpec>, manual: &[&str], auto: &[&str]) -> LatticeCluster {
    let list = |pools: &[&str]| {
        (!pools.is_empty()).then(|| pools.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    };
    let mut cluster = LatticeCluster::new(
        "dev",
        LatticeClusterSpec {
            cell_ref: Some(CELL.to_string()),
            kubernetes: KubernetesSpec {
                version: "1.32.0".to_string(),
                kubelet: None,
            },
            workers: pools,
            profile_ref: None,
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.resource_version = Some("100".to_string());
    cluster.status = Some(LatticeClusterStatus {
        in_place_updates: (!manual.is_empty() || !auto.is_empty()).then(|| InPlaceUpdatesStatus {
            pending_worker_updates: Some(PendingWorkerUpdates {
                manual_in_place_update: list(manual),
                auto_in_place_update: list(auto),
            }),
        }),
        ..Default::default()
    });
    cluster
}

fn forced(mut cluster: LatticeCluster) -> LatticeCluster {
    cluster.metadata.annotations = Some(BTreeMap::from([
        (
            OPERATION_ANNOTATION.to_string(),
            OPERATION_FORCE_IN_PLACE_UPDATE.to_string(),
        ),
        ("team".to_string(), "platform".to_string()),
    ]));
    cluster
}

fn worker(hashes: BTreeMap<String, String>) -> Worker {
    let mut worker = Worker::new("dev", WorkerSpec::default());
    worker.metadata.namespace = Some(CONTROL_PLANE.to_string());
    worker.status = Some(WorkerStatus {
        in_place_updates: Some(WorkerInPlaceUpdates {
            worker_pool_to_hash_map: Some(hashes),
        }),
    });
    worker
}

fn applied(cluster: &LatticeCluster, pools: &[&str]) -> BTreeMap<String, String> {
    cluster
        .spec
        .workers
        .iter()
        .filter(|p| pools.contains(&p.name.as_str()))
        .map(|p| {
            let fp = EffectivePoolConfig::resolve(cluster, p).fingerprint().unwrap();
            (p.name.clone(), fp)
        })
        .collect()
}

fn context(api: Arc<FakeApiServer>) -> Arc<Context> {
    Arc::new(Context::new(api, InPlaceStatusConfig::new(CELL)))
}

async fn sync(ctx: &Context) -> SyncOutcome {
    sync_pending_updates(ctx, NAMESPACE, "dev").await.unwrap()
}

/// Scenario A: a manual pool the actuator never applied becomes pending.
#[tokio::test]
async fn unapplied_manual_pool_is_recorded_as_pending() {
    let api = FakeApiServer::new(
        cluster(
            vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)],
            &["pool-retired"],
            &[],
        ),
        worker(BTreeMap::new()),
    );
    let ctx = context(api.clone());

    assert_eq!(
        sync(&ctx).await,
        SyncOutcome::Updated {
            pending: vec!["pool-a".to_string()],
            operation_removed: false
        }
    );
    assert_eq!(api.cluster().manual_in_place_pending(), ["pool-a".to_string()]);
}

/// Scenario B: the applied fingerprint matches, so every level collapses.
#[tokio::test]
async fn applied_pool_collapses_status() {
    let c = cluster(
        vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)],
        &["pool-a"],
        &[],
    );
    let api = FakeApiServer::new(c.clone(), worker(applied(&c, &["pool-a"])));
    let ctx = context(api.clone());

    sync(&ctx).await;

    let status = api.cluster().status.unwrap();
    assert!(status.in_place_updates.is_none());
    assert_eq!(api.writes(), (1, 0));
}

/// Scenario C: as B, with the force operation set, which gets removed while
/// every other annotation stays.
#[tokio::test]
async fn resolved_drift_removes_force_operation_only() {
    let c = forced(cluster(
        vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)],
        &["pool-a"],
        &[],
    ));
    let api = FakeApiServer::new(c.clone(), worker(applied(&c, &["pool-a"])));
    let ctx = context(api.clone());

    assert_eq!(
        sync(&ctx).await,
        SyncOutcome::Updated {
            pending: vec![],
            operation_removed: true
        }
    );

    let stored = api.cluster();
    assert!(!stored.has_force_in_place_update());
    assert_eq!(
        stored.annotations().get("team").map(String::as_str),
        Some("platform")
    );
    assert_eq!(stored.resource_version().as_deref(), Some("102"));
    assert_eq!(api.writes(), (1, 1));
}

#[tokio::test]
async fn auto_pending_pools_survive_untouched() {
    let c = forced(cluster(
        vec![
            pool("pool-a", UpdateStrategy::ManualInPlaceUpdate),
            pool("pool-z", UpdateStrategy::AutoInPlaceUpdate),
        ],
        &["pool-a"],
        &["pool-z"],
    ));
    let api = FakeApiServer::new(c.clone(), worker(applied(&c, &["pool-a"])));
    let ctx = context(api.clone());

    sync(&ctx).await;

    let stored = api.cluster();
    let pending = stored
        .status
        .and_then(|s| s.in_place_updates)
        .and_then(|u| u.pending_worker_updates)
        .unwrap();
    assert_eq!(pending.manual_in_place_update, None);
    assert_eq!(pending.auto_in_place_update, Some(vec!["pool-z".to_string()]));
    assert!(stored.metadata.annotations.unwrap().contains_key(OPERATION_ANNOTATION));
}

/// Reconciling again after convergence writes nothing.
#[tokio::test]
async fn reconcile_is_idempotent() {
    let c = cluster(
        vec![
            pool("pool-c", UpdateStrategy::ManualInPlaceUpdate),
            pool("pool-a", UpdateStrategy::ManualInPlaceUpdate),
            pool("pool-b", UpdateStrategy::ManualInPlaceUpdate),
        ],
        &["pool-x"],
        &[],
    );
    let api = FakeApiServer::new(c.clone(), worker(applied(&c, &["pool-a"])));
    let ctx = context(api.clone());

    reconcile(Arc::new(c.clone()), ctx.clone()).await.unwrap();
    assert_eq!(api.writes(), (1, 0));
    assert_eq!(
        api.cluster().manual_in_place_pending(),
        ["pool-c".to_string(), "pool-b".to_string()]
    );

    reconcile(Arc::new(c), ctx).await.unwrap();
    assert_eq!(api.writes(), (1, 0));
}

/// A reconciler working from an outdated read loses the version race and
/// the retry converges from a fresh read.
#[tokio::test]
async fn concurrent_write_is_detected_and_retried() {
    let c = cluster(
        vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)],
        &["pool-x"],
        &[],
    );
    let api = FakeApiServer::new(c.clone(), worker(BTreeMap::new()));

    struct StaleReads {
        api: Arc<FakeApiServer>,
        stale: LatticeCluster,
        served: AtomicUsize,
    }

    #[async_trait]
    impl KubeClient for StaleReads {
        async fn get_cluster(&self, ns: &str, name: &str) -> Result<Option<LatticeCluster>, Error> {
            if self.served.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(Some(self.stale.clone()));
            }
            self.api.get_cluster(ns, name).await
        }
        async fn get_worker(&self, ns: &str, name: &str) -> Result<Option<Worker>, Error> {
            self.api.get_worker(ns, name).await
        }
        async fn patch_cluster_status(
            &self,
            ns: &str,
            name: &str,
            patch: &Value,
        ) -> Result<Option<String>, Error> {
            self.api.patch_cluster_status(ns, name, patch).await
        }
        async fn patch_cluster(&self, ns: &str, name: &str, patch: &Value) -> Result<(), Error> {
            self.api.patch_cluster(ns, name, patch).await
        }
    }

    // Another writer bumps the resource version after our first read
    api.apply(&serde_json::json!({"metadata": {"labels": {"touched": "yes"}}}))
        .unwrap();

    let ctx = Arc::new(Context::new(
        Arc::new(StaleReads {
            api: api.clone(),
            stale: c,
            served: AtomicUsize::new(0),
        }),
        InPlaceStatusConfig::new(CELL),
    ));

    let err = sync_pending_updates(&ctx, NAMESPACE, "dev").await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(api.cluster().manual_in_place_pending(), ["pool-x".to_string()]);

    sync_pending_updates(&ctx, NAMESPACE, "dev").await.unwrap();
    assert_eq!(api.cluster().manual_in_place_pending(), ["pool-a".to_string()]);
}

struct GroupFixture {
    groups: BTreeMap<String, NodeGroup>,
}

#[async_trait]
impl NodeGroupResolver for GroupFixture {
    async fn resolve_group(&self, machine: &Machine) -> Result<Option<NodeGroup>, Error> {
        Ok(machine
            .node_group_name()
            .and_then(|name| self.groups.get(name).cloned()))
    }
}

fn machine(group: &str, reason: Option<&str>) -> Machine {
    let mut m = Machine::new(
        "m-1",
        MachineObjectSpec {
            node_name: Some("node-1".to_string()),
            ..Default::default()
        },
    );
    m.metadata.namespace = Some(CONTROL_PLANE.to_string());
    m.metadata.labels = Some(BTreeMap::from([(
        NODE_GROUP_LABEL.to_string(),
        group.to_string(),
    )]));
    m.status = reason.map(|r| MachineStatus {
        conditions: vec![MachineCondition {
            type_: IN_PLACE_UPDATE_CONDITION.to_string(),
            status: "True".to_string(),
            reason: Some(r.to_string()),
            ..Default::default()
        }],
    });
    m
}

fn filter() -> TransitionFilter {
    let manual = NodeGroup::new(
        "pool-a",
        NodeGroupSpec {
            replicas: 3,
            strategy: NodeGroupStrategy {
                type_: StrategyType::InPlaceUpdate,
                orchestration_type: OrchestrationType::Manual,
            },
        },
    );
    TransitionFilter::new(
        Arc::new(GroupFixture {
            groups: BTreeMap::from([("pool-a".to_string(), manual)]),
        }),
        Duration::from_secs(5),
    )
}

/// Scenario D: a machine whose group does not exist is not admitted.
#[tokio::test]
async fn machine_of_unknown_group_is_not_admitted() {
    let filter = filter();
    assert!(!filter.admits(&MachineEvent::Create(machine("pool-missing", None))).await);
    assert!(filter.admits(&MachineEvent::Create(machine("pool-a", None))).await);
}

#[tokio::test]
async fn only_selection_of_candidate_is_admitted() {
    let filter = filter();
    let selected = MachineEvent::Update {
        old: machine("pool-a", Some("CandidateForUpdate")),
        new: machine("pool-a", Some("SelectedForUpdate")),
    };
    let finished = MachineEvent::Update {
        old: machine("pool-a", Some("ReadyForUpdate")),
        new: machine("pool-a", Some("UpdateSuccessful")),
    };
    assert!(filter.admits(&selected).await);
    assert!(!filter.admits(&finished).await);
    assert!(
        !filter
            .admits(&MachineEvent::Delete(machine("pool-a", Some("SelectedForUpdate"))))
            .await
    );
}
