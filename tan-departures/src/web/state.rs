//! Application state for the web layer.

use std::sync::Arc;

use crate::registry::CoordinatorRegistry;

/// Shared application state.
pub struct AppState<C> {
    /// Coordinators of every monitored stop
    pub registry: Arc<CoordinatorRegistry<C>>,
}

impl<C> AppState<C> {
    /// Create a new app state.
    pub fn new(registry: Arc<CoordinatorRegistry<C>>) -> Self {
        Self { registry }
    }
}

// Manual impl: the client type itself need not be `Clone`.
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}
