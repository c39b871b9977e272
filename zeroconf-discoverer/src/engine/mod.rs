//! The discovery engine seam.
//!
//! The engine owns the network side of discovery and calls listeners back
//! from its own threads. Listeners must therefore be `Send + Sync` and must
//! return promptly.

pub mod mdns;
#[cfg(test)]
pub mod mock;

use std::sync::Arc;
use shared::types::{ServiceEvent, ServiceTypeName};
use crate::error::DiscoveryError;

/// Identifies a registered type listener so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Notified once per newly observed service type.
pub trait ServiceTypeListener: Send + Sync {
    fn service_type_added(&self, service_type: &ServiceTypeName);
}

/// Notified about instances of one service type.
pub trait ServiceListener: Send + Sync {
    fn service_added(&self, event: &ServiceEvent);
    fn service_removed(&self, event: &ServiceEvent);
    fn service_resolved(&self, event: &ServiceEvent);
}

pub trait DiscoveryEngine: Send + Sync {
    /// Starts type enumeration and delivers every type to `listener`.
    fn add_service_type_listener(
        &self,
        listener: Arc<dyn ServiceTypeListener>,
    ) -> Result<ListenerId, DiscoveryError>;

    fn remove_service_type_listener(&self, id: ListenerId);

    /// Starts browsing `service_type` and delivers its instance events to `listener`.
    fn add_service_listener(
        &self,
        service_type: &ServiceTypeName,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<(), DiscoveryError>;

    /// Asks the engine to resolve one instance. Never blocks.
    fn request_service_info(&self, service_type: &ServiceTypeName, instance_name: &str);

    /// Stops every instance browse and drops every service listener.
    fn unregister_all_services(&self);

    /// Releases the handle. No callbacks are delivered afterwards.
    fn close(&self) -> Result<(), DiscoveryError>;
}
