//! Lookup of running coordinators by stop code.
//!
//! Built once by the host, then shared read-only with whatever needs to
//! find a stop's coordinator (the web layer, the pollers).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::coordinator::{DepartureCoordinator, TransitFeed, spawn_poller};

/// Errors when building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two coordinators were registered for the same stop
    #[error("stop {0} is already registered")]
    DuplicateStop(String),
}

/// Coordinators keyed by the stop code they poll.
pub struct CoordinatorRegistry<C> {
    coordinators: BTreeMap<String, Arc<DepartureCoordinator<C>>>,
}

impl<C: TransitFeed> CoordinatorRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            coordinators: BTreeMap::new(),
        }
    }

    /// Add a coordinator under its stop code.
    pub fn register(&mut self, coordinator: DepartureCoordinator<C>) -> Result<(), RegistryError> {
        let stop_id = coordinator.stop_id().to_string();
        if self.coordinators.contains_key(&stop_id) {
            return Err(RegistryError::DuplicateStop(stop_id));
        }
        self.coordinators.insert(stop_id, Arc::new(coordinator));
        Ok(())
    }

    /// Look up the coordinator polling `stop_id`.
    pub fn get(&self, stop_id: &str) -> Option<Arc<DepartureCoordinator<C>>> {
        self.coordinators.get(stop_id).cloned()
    }

    /// All coordinators, ordered by stop code.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DepartureCoordinator<C>>> {
        self.coordinators.values()
    }

    /// Number of registered stops.
    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    /// Check if no stop is registered.
    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }
}

impl<C: TransitFeed + 'static> CoordinatorRegistry<C> {
    /// Start one poller per registered stop.
    pub fn spawn_pollers(&self, period: Duration) -> Vec<JoinHandle<()>> {
        self.iter()
            .map(|coordinator| spawn_poller(Arc::clone(coordinator), period))
            .collect()
    }
}

impl<C: TransitFeed> Default for CoordinatorRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
