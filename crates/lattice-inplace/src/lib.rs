//! Manual in-place update tracking for Lattice worker pools
//!
//! Worker pools using the `ManualInPlaceUpdate` strategy are only updated
//! after an operator asks for it. This crate keeps the list of such pools with
//! pending configuration changes on the LatticeCluster status, and decides
//! which machine events are worth a reconciliation.
//!
//! - [`hash`]: fingerprints of a pool's update-relevant configuration
//! - [`drift`]: which manual pools differ from what was last applied
//! - [`controller`]: the status reconciler and its error policy
//! - [`predicate`] and [`events`]: machine event admission

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod drift;
pub mod events;
pub mod hash;
pub mod mapping;
pub mod predicate;

pub use config::InPlaceStatusConfig;
pub use controller::{error_policy, reconcile, Context, KubeClient, KubeClientImpl, SyncOutcome};
pub use events::{admitted_machines, MachineEvent, MachineEventTracker};
pub use predicate::{InPlaceUpdateReason, KubeNodeGroupResolver, NodeGroupResolver, TransitionFilter};
