//! Machine watch events
//!
//! A kube watcher reports the current object only. [`MachineEventTracker`]
//! remembers the last observed version of every machine so an update can be
//! presented with both its old and new state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{future, stream, Stream, StreamExt};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use tracing::{trace, warn};

use lattice_common::crd::Machine;

use crate::predicate::TransitionFilter;

/// A change to a machine as seen by the status controller
#[derive(Clone, Debug)]
pub enum MachineEvent {
    /// A machine was observed for the first time
    Create(Machine),
    /// A known machine changed
    Update {
        /// Last observed version
        old: Machine,
        /// Current version
        new: Machine,
    },
    /// A machine disappeared
    Delete(Machine),
    /// A notification from outside the watch stream
    Generic(Machine),
}

impl MachineEvent {
    /// The most recent version of the machine
    pub fn machine(&self) -> &Machine {
        match self {
            MachineEvent::Create(m) | MachineEvent::Delete(m) | MachineEvent::Generic(m) => m,
            MachineEvent::Update { new, .. } => new,
        }
    }

    /// Consume the event, keeping the most recent version of the machine
    pub fn into_machine(self) -> Machine {
        match self {
            MachineEvent::Create(m) | MachineEvent::Delete(m) | MachineEvent::Generic(m) => m,
            MachineEvent::Update { new, .. } => new,
        }
    }
}

/// Turns raw watcher events into [`MachineEvent`]s
#[derive(Debug, Default)]
pub struct MachineEventTracker {
    known: HashMap<ObjectRef<Machine>, Machine>,
    relisted: Option<HashSet<ObjectRef<Machine>>>,
}

impl MachineEventTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one watcher event and return the machine events it implies
    pub fn observe(&mut self, event: watcher::Event<Machine>) -> Vec<MachineEvent> {
        match event {
            watcher::Event::Apply(machine) => vec![self.upsert(machine)],
            watcher::Event::Delete(machine) => {
                self.known.remove(&ObjectRef::from_obj(&machine));
                vec![MachineEvent::Delete(machine)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                vec![]
            }
            watcher::Event::InitApply(machine) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectRef::from_obj(&machine));
                }
                vec![self.upsert(machine)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return vec![];
                };
                let gone: Vec<_> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|key| self.known.remove(&key))
                    .map(MachineEvent::Delete)
                    .collect()
            }
        }
    }

    fn upsert(&mut self, machine: Machine) -> MachineEvent {
        match self
            .known
            .insert(ObjectRef::from_obj(&machine), machine.clone())
        {
            Some(old) => MachineEvent::Update { old, new: machine },
            None => MachineEvent::Create(machine),
        }
    }
}

/// Machines whose latest event passes `filter`
///
/// Watch errors are logged and skipped; the watcher's own backoff handles
/// reconnection.
pub fn admitted_machines<S>(
    events: S,
    filter: Arc<TransitionFilter>,
) -> impl Stream<Item = Machine> + Send
where
    S: Stream<Item = Result<watcher::Event<Machine>, watcher::Error>> + Send + 'static,
{
    let mut tracker = MachineEventTracker::new();
    events
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "machine watch error");
                    None
                }
            })
        })
        .flat_map(move |event| stream::iter(tracker.observe(event)))
        .filter_map(move |event| {
            let filter = filter.clone();
            async move {
                if filter.admits(&event).await {
                    Some(event.into_machine())
                } else {
                    trace!(machine = ?event.machine().metadata.name, "machine event filtered");
                    None
                }
            }
        })
}
