use std::sync::{Arc, Weak};
use shared::types::{ResolvedServiceRecord, ServiceEvent, ServiceTypeName};
use crate::engine::{DiscoveryEngine, ServiceListener};
use crate::store::EventStore;

/// Tracks the instances of one service type and stores each resolution.
pub struct InstanceListener {
    service_type: ServiceTypeName,
    engine: Weak<dyn DiscoveryEngine>,
    store: Arc<EventStore>,
}

impl InstanceListener {
    pub fn new(
        service_type: ServiceTypeName,
        engine: Weak<dyn DiscoveryEngine>,
        store: Arc<EventStore>,
    ) -> Self {
        Self {
            service_type,
            engine,
            store,
        }
    }
}

impl ServiceListener for InstanceListener {
    fn service_added(&self, event: &ServiceEvent) {
        tracing::debug!("Service added: {} (browsing {})", event.instance_key(), self.service_type);

        match self.engine.upgrade() {
            Some(engine) => engine.request_service_info(&event.service_type, &event.name),
            None => tracing::debug!("Engine gone, not resolving {}", event.instance_key()),
        }
    }

    fn service_removed(&self, event: &ServiceEvent) {
        // Stored records are a trace of what was seen; removals never retract them.
        tracing::debug!("Service removed: {}", event.instance_key());
    }

    fn service_resolved(&self, event: &ServiceEvent) {
        match ResolvedServiceRecord::from_event(event) {
            Some(record) => {
                tracing::debug!(
                    "Resolved service: {} port {}",
                    record.info.qualified_name,
                    record.info.port
                );
                self.store.append(record);
            }
            None => {
                tracing::warn!(
                    "Resolved event for {} carries no service info, dropping",
                    event.instance_key()
                );
            }
        }
    }
}
