//! Drift detection for manual in-place worker pools

use std::collections::BTreeMap;

use lattice_common::crd::LatticeCluster;
use lattice_common::Error;

use crate::hash::EffectivePoolConfig;

/// Pools of `cluster` waiting for a manual in-place update, in declaration order
///
/// A pool is pending when it uses `ManualInPlaceUpdate` and `applied` either
/// has no fingerprint for it or holds one that differs from the current
/// configuration. Pools using any other strategy are never pending, whatever
/// `applied` says about them.
pub fn pending_manual_updates(
    cluster: &LatticeCluster,
    applied: &BTreeMap<String, String>,
) -> Result<Vec<String>, Error> {
    let mut pending = Vec::new();
    for pool in &cluster.spec.workers {
        if !pool.update_strategy.is_manual_in_place() {
            continue;
        }
        let current = EffectivePoolConfig::resolve(cluster, pool).fingerprint()?;
        if applied.get(&pool.name) != Some(&current) {
            pending.push(pool.name.clone());
        }
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_common::crd::{
        KubernetesSpec, LatticeClusterSpec, MachineImage, MachineSpec, UpdateStrategy,
        WorkerPoolSpec,
    };

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
            ..Default::default()
        }
    }

    fn cluster(workers: Vec<WorkerPoolSpec>) -> LatticeCluster {
        LatticeCluster::new(
            "dev",
            LatticeClusterSpec {
                kubernetes: KubernetesSpec {
                    version: "1.32.0".to_string(),
                    kubelet: None,
                },
                workers,
                ..Default::default()
            },
        )
    }

    fn current(cluster: &LatticeCluster, name: &str) -> String {
        let pool = cluster
            .spec
            .workers
            .iter()
            .find(|p| p.name == name)
            .unwrap();
        EffectivePoolConfig::resolve(cluster, pool)
            .fingerprint()
            .unwrap()
    }

    #[test]
    fn unrecorded_manual_pool_is_pending() {
        let c = cluster(vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)]);
        assert_eq!(
            pending_manual_updates(&c, &BTreeMap::new()).unwrap(),
            vec!["pool-a"]
        );
    }

    #[test]
    fn matching_fingerprint_is_not_pending() {
        let c = cluster(vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)]);
        let applied = BTreeMap::from([("pool-a".to_string(), current(&c, "pool-a"))]);
        assert!(pending_manual_updates(&c, &applied).unwrap().is_empty());
    }

    #[test]
    fn stale_fingerprint_is_pending() {
        let c = cluster(vec![pool("pool-a", UpdateStrategy::ManualInPlaceUpdate)]);
        let applied = BTreeMap::from([("pool-a".to_string(), "stale".to_string())]);
        assert_eq!(pending_manual_updates(&c, &applied).unwrap(), vec!["pool-a"]);
    }

    /// Story: an operator switches a pool away from manual updates while a
    /// stale fingerprint is still recorded. The pool stops being pending.
    #[test]
    fn story_pool_leaving_manual_strategy_is_never_pending() {
        let c = cluster(vec![
            pool("pool-a", UpdateStrategy::AutoInPlaceUpdate),
            pool("pool-b", UpdateStrategy::AutoRollingUpdate),
        ]);
        let applied = BTreeMap::from([
            ("pool-a".to_string(), "stale".to_string()),
            ("pool-b".to_string(), "stale".to_string()),
        ]);
        assert!(pending_manual_updates(&c, &applied).unwrap().is_empty());
    }

    #[test]
    fn result_follows_declaration_order() {
        let c = cluster(vec![
            pool("zeta", UpdateStrategy::ManualInPlaceUpdate),
            pool("alpha", UpdateStrategy::AutoRollingUpdate),
            pool("mid", UpdateStrategy::ManualInPlaceUpdate),
            pool("beta", UpdateStrategy::ManualInPlaceUpdate),
        ]);
        let applied = BTreeMap::from([("mid".to_string(), current(&c, "mid"))]);
        assert_eq!(
            pending_manual_updates(&c, &applied).unwrap(),
            vec!["zeta", "beta"]
        );
    }
}
