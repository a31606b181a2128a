//! Machine event admission
//!
//! Machines change constantly while they are updated; the status controller
//! only cares about two of those changes: a machine appearing in a manual
//! in-place NodeGroup, and an operator selecting a candidate machine for its
//! update. [`TransitionFilter`] decides per event whether it is one of them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use lattice_common::crd::{Machine, NodeGroup, IN_PLACE_UPDATE_CONDITION};
use lattice_common::Error;

use crate::events::MachineEvent;

/// Reason of a machine's `InPlaceUpdate` condition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InPlaceUpdateReason {
    /// The machine runs an outdated configuration and may be selected
    CandidateForUpdate,
    /// An operator selected the machine for its update
    SelectedForUpdate,
    /// The machine is drained and ready to be updated
    ReadyForUpdate,
    /// The update finished
    UpdateSuccessful,
    /// The update failed
    UpdateFailed,
    /// Any reason this controller does not know about
    Unknown,
}

impl InPlaceUpdateReason {
    /// Parse a condition reason
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            "CandidateForUpdate" => Self::CandidateForUpdate,
            "SelectedForUpdate" => Self::SelectedForUpdate,
            "ReadyForUpdate" => Self::ReadyForUpdate,
            "UpdateSuccessful" => Self::UpdateSuccessful,
            "UpdateFailed" => Self::UpdateFailed,
            _ => Self::Unknown,
        }
    }

    /// Reason of the machine's `InPlaceUpdate` condition, if it has one
    pub fn of(machine: &Machine) -> Option<Self> {
        machine
            .condition(IN_PLACE_UPDATE_CONDITION)
            .and_then(|c| c.reason.as_deref())
            .map(Self::from_reason)
    }

    /// True if moving from `self` to `next` must wake the status controller
    pub fn wakes_controller(self, next: Self) -> bool {
        use InPlaceUpdateReason::*;
        match (self, next) {
            (CandidateForUpdate, SelectedForUpdate) => true,
            (CandidateForUpdate, _)
            | (SelectedForUpdate, _)
            | (ReadyForUpdate, _)
            | (UpdateSuccessful, _)
            | (UpdateFailed, _)
            | (Unknown, _) => false,
        }
    }
}

/// Looks up the NodeGroup owning a machine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeGroupResolver: Send + Sync {
    /// The machine's NodeGroup, or `None` if the machine has no group label
    /// or the group does not exist
    async fn resolve_group(&self, machine: &Machine) -> Result<Option<NodeGroup>, Error>;
}

/// Resolves NodeGroups through the API server
pub struct KubeNodeGroupResolver {
    client: Client,
}

impl KubeNodeGroupResolver {
    /// Create a resolver using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeGroupResolver for KubeNodeGroupResolver {
    async fn resolve_group(&self, machine: &Machine) -> Result<Option<NodeGroup>, Error> {
        let Some(group) = machine.node_group_name() else {
            return Ok(None);
        };
        let namespace = machine.namespace().unwrap_or_default();
        let api: Api<NodeGroup> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.get_opt(group).await?)
    }
}

/// Decides which machine events reach the status controller
pub struct TransitionFilter {
    resolver: Arc<dyn NodeGroupResolver>,
    lookup_timeout: Duration,
}

impl TransitionFilter {
    /// Create a filter resolving groups with `resolver`, each lookup bounded by `lookup_timeout`
    pub fn new(resolver: Arc<dyn NodeGroupResolver>, lookup_timeout: Duration) -> Self {
        Self {
            resolver,
            lookup_timeout,
        }
    }

    /// True if the event must enqueue the machine's cluster
    ///
    /// Never fails: lookup errors are logged and reject the event.
    pub async fn admits(&self, event: &MachineEvent) -> bool {
        match event {
            MachineEvent::Delete(_) | MachineEvent::Generic(_) => false,
            MachineEvent::Create(machine) => self.in_manual_in_place_group(machine).await,
            MachineEvent::Update { old, new } => {
                let transition = InPlaceUpdateReason::of(old).zip(InPlaceUpdateReason::of(new));
                match transition {
                    Some((from, to)) if from.wakes_controller(to) => {
                        self.in_manual_in_place_group(new).await
                    }
                    _ => false,
                }
            }
        }
    }

    async fn in_manual_in_place_group(&self, machine: &Machine) -> bool {
        let name = machine.name_any();
        let lookup = tokio::time::timeout(self.lookup_timeout, self.resolver.resolve_group(machine));
        match lookup.await {
            Ok(Ok(Some(group))) => group.spec.strategy.is_manual_in_place(),
            Ok(Ok(None)) => {
                debug!(machine = %name, "machine has no node group");
                false
            }
            Ok(Err(e)) => {
                warn!(machine = %name, error = %e, "failed to get node group for machine");
                false
            }
            Err(_) => {
                warn!(
                    machine = %name,
                    timeout_ms = self.lookup_timeout.as_millis(),
                    "node group lookup timed out"
                );
                false
            }
        }
    }
}
