//! Controller runner - builds the in-place status controller future
//!
//! The controller is keyed on LatticeCluster. Workers, admitted machine events,
//! optionally ClusterProfiles, and a periodic resync all map back onto the
//! clusters they affect.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, StreamExt};
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client};
use tokio_stream::wrappers::IntervalStream;

use lattice_common::crd::{ClusterProfile, LatticeCluster, Machine, Worker};
use lattice_inplace::mapping::{clusters_for_machine, clusters_for_profile, clusters_for_worker};
use lattice_inplace::{
    admitted_machines, error_policy, reconcile, Context, InPlaceStatusConfig,
    KubeNodeGroupResolver, TransitionFilter,
};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the in-place status controller future
pub fn build_inplace_status_controller(
    client: Client,
    config: InPlaceStatusConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(Context::builder(client.clone(), config.clone()).build());
    let clusters: Api<LatticeCluster> = Api::all(client.clone());
    let workers: Api<Worker> = Api::all(client.clone());
    let machines: Api<Machine> = Api::all(client.clone());

    let controller = Controller::new(clusters, watcher_config())
        .with_config(ControllerConfig::default().concurrency(config.concurrent_syncs));
    let store = controller.store();

    let worker_store = store.clone();
    let mut controller = controller.watches(workers, watcher_config(), move |worker| {
        clusters_for_worker(worker_store.state(), &worker)
    });

    if config.ignore_operation_annotation {
        let profiles: Api<ClusterProfile> = Api::all(client.clone());
        let profile_store = store.clone();
        controller = controller.watches(profiles, watcher_config(), move |profile| {
            clusters_for_profile(profile_store.state(), &profile)
        });
        tracing::info!("- ClusterProfile trigger");
    }

    let filter = Arc::new(TransitionFilter::new(
        Arc::new(KubeNodeGroupResolver::new(client)),
        config.lookup_timeout,
    ));
    let machine_store = store;
    let machine_triggers = admitted_machines(
        watcher::watcher(machines, watcher_config()).default_backoff(),
        filter,
    )
    .flat_map(move |machine| stream::iter(clusters_for_machine(machine_store.state(), &machine)));

    let resync = IntervalStream::new(tokio::time::interval(config.sync_period)).map(|_| ());

    tracing::info!(
        concurrency = config.concurrent_syncs,
        sync_period_secs = config.sync_period.as_secs(),
        "- In-place update status controller"
    );

    Box::pin(
        controller
            .reconcile_on(machine_triggers)
            .reconcile_all_on(resync)
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("InPlaceStatus")),
    )
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
