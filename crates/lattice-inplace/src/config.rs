//! Runtime configuration of the in-place status controller

use std::time::Duration;

use lattice_common::backoff::BackoffConfig;
use lattice_common::Error;

/// Default number of clusters reconciled in parallel
pub const DEFAULT_CONCURRENT_SYNCS: u16 = 5;
/// Default interval between full resyncs
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(30);
/// Default deadline for one reconciliation attempt
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(180);
/// Default deadline for the NodeGroup lookup of a machine event
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for the in-place status controller
#[derive(Clone, Debug)]
pub struct InPlaceStatusConfig {
    /// Cell whose clusters this controller reconciles
    pub cell_name: String,
    /// Clusters reconciled in parallel
    pub concurrent_syncs: u16,
    /// Interval of the periodic full resync
    pub sync_period: Duration,
    /// Deadline for one reconciliation attempt
    pub reconcile_timeout: Duration,
    /// Deadline for the NodeGroup lookup of a machine event
    pub lookup_timeout: Duration,
    /// Also reconcile when a referenced ClusterProfile changes
    pub ignore_operation_annotation: bool,
    /// Requeue delays after failed attempts
    pub backoff: BackoffConfig,
}

impl InPlaceStatusConfig {
    /// Defaults for the given cell
    pub fn new(cell_name: impl Into<String>) -> Self {
        Self {
            cell_name: cell_name.into(),
            concurrent_syncs: DEFAULT_CONCURRENT_SYNCS,
            sync_period: DEFAULT_SYNC_PERIOD,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            ignore_operation_annotation: false,
            backoff: BackoffConfig::default(),
        }
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.cell_name.trim().is_empty() {
            return Err(Error::validation_for_field(
                "config",
                "cellName",
                "must not be empty",
            ));
        }
        if self.concurrent_syncs == 0 {
            return Err(Error::validation_for_field(
                "config",
                "concurrentSyncs",
                "must be at least 1",
            ));
        }
        for (field, value) in [
            ("syncPeriod", self.sync_period),
            ("reconcileTimeout", self.reconcile_timeout),
            ("lookupTimeout", self.lookup_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::validation_for_field(
                    "config",
                    field,
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}
