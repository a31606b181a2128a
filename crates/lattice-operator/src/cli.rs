//! Command line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use lattice_common::telemetry::LogFormat;
use lattice_inplace::config::{
    DEFAULT_CONCURRENT_SYNCS, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_RECONCILE_TIMEOUT,
    DEFAULT_SYNC_PERIOD,
};
use lattice_inplace::InPlaceStatusConfig;

/// Lattice operator - tracks pending manual in-place updates of worker pools
#[derive(Parser, Debug)]
#[command(name = "lattice-operator", version, about, long_about = None)]
pub struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Log output format
    #[arg(long, value_enum, env = "LATTICE_LOG_FORMAT", default_value_t = LogFormatArg::Json, global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Operator subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches LatticeClusters of this cell and keeps their pending manual
    /// in-place worker updates in sync with what the worker actuator applied.
    Controller(ControllerArgs),
}

/// Settings of the controller subcommand
#[derive(Parser, Debug, Clone)]
#[command(name = "controller")]
pub struct ControllerArgs {
    /// Cell whose clusters are reconciled
    #[arg(long, env = "LATTICE_CELL_NAME")]
    pub cell_name: String,

    /// Clusters reconciled in parallel
    #[arg(long, env = "LATTICE_CONCURRENT_SYNCS", default_value_t = DEFAULT_CONCURRENT_SYNCS)]
    pub concurrent_syncs: u16,

    /// Seconds between full resyncs of every cluster
    #[arg(long, env = "LATTICE_SYNC_PERIOD_SECS", default_value_t = DEFAULT_SYNC_PERIOD.as_secs())]
    pub sync_period_secs: u64,

    /// Deadline in seconds for one reconciliation attempt
    #[arg(long, env = "LATTICE_RECONCILE_TIMEOUT_SECS", default_value_t = DEFAULT_RECONCILE_TIMEOUT.as_secs())]
    pub reconcile_timeout_secs: u64,

    /// Deadline in seconds for the NodeGroup lookup of a machine event
    #[arg(long, env = "LATTICE_LOOKUP_TIMEOUT_SECS", default_value_t = DEFAULT_LOOKUP_TIMEOUT.as_secs())]
    pub lookup_timeout_secs: u64,

    /// Also reconcile clusters when their ClusterProfile changes
    #[arg(long, env = "LATTICE_IGNORE_OPERATION_ANNOTATION")]
    pub ignore_operation_annotation: bool,

    /// Path to a kubeconfig; in-cluster or default config when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Install or upgrade the CRDs before starting
    #[arg(long, env = "LATTICE_INSTALL_CRDS")]
    pub install_crds: bool,
}

impl ControllerArgs {
    /// Controller configuration from these arguments
    pub fn to_config(&self) -> InPlaceStatusConfig {
        InPlaceStatusConfig {
            concurrent_syncs: self.concurrent_syncs,
            sync_period: Duration::from_secs(self.sync_period_secs),
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
            ignore_operation_annotation: self.ignore_operation_annotation,
            ..InPlaceStatusConfig::new(self.cell_name.clone())
        }
    }
}

/// Log output format flag
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// One JSON object per line
    Json,
    /// Human-readable lines
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}
