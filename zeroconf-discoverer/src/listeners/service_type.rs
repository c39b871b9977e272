use std::sync::{Arc, Weak};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared::types::ServiceTypeName;
use crate::engine::{DiscoveryEngine, ServiceTypeListener};
use crate::listeners::InstanceListener;
use crate::store::EventStore;

/// Reacts to type enumeration by browsing each new type with its own
/// instance listener. All instance listeners share one store.
pub struct TypeListener {
    engine: Weak<dyn DiscoveryEngine>,
    store: Arc<EventStore>,
    browsing: DashMap<ServiceTypeName, Arc<InstanceListener>>,
}

impl TypeListener {
    pub fn new(engine: Weak<dyn DiscoveryEngine>, store: Arc<EventStore>) -> Self {
        Self {
            engine,
            store,
            browsing: DashMap::new(),
        }
    }

    /// Number of types with a registered instance listener
    pub fn browsed_count(&self) -> usize {
        self.browsing.len()
    }

    pub fn browsed_types(&self) -> Vec<ServiceTypeName> {
        let mut types: Vec<_> = self.browsing.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    /// Drops every instance listener handle. Called at session teardown.
    pub fn clear(&self) {
        self.browsing.clear();
    }
}

impl ServiceTypeListener for TypeListener {
    fn service_type_added(&self, service_type: &ServiceTypeName) {
        let Some(engine) = self.engine.upgrade() else {
            tracing::debug!("Engine gone, ignoring service type {}", service_type);
            return;
        };

        let listener = match self.browsing.entry(service_type.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!("Already browsing {}", service_type);
                return;
            }
            Entry::Vacant(slot) => {
                let listener = Arc::new(InstanceListener::new(
                    service_type.clone(),
                    self.engine.clone(),
                    self.store.clone(),
                ));
                slot.insert(listener.clone());
                listener
            }
        };

        // Shard lock is released here; the engine may call back into us.
        match engine.add_service_listener(service_type, listener) {
            Ok(()) => tracing::info!("Discovered new service type: {}", service_type),
            Err(e) => {
                tracing::error!("Failed to browse {}: {}", service_type, e);
                self.browsing.remove(service_type);
            }
        }
    }
}
