//! In-process engine used by tests. Events are injected by the test, usually
//! from a spawned thread, and dispatched to whatever listeners are registered
//! at that moment.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use shared::types::{ServiceEvent, ServiceInfo, ServiceTypeName};
use crate::engine::{DiscoveryEngine, ListenerId, ServiceListener, ServiceTypeListener};
use crate::error::DiscoveryError;

pub fn test_info(name: &str, service_type: &str, port: u16) -> ServiceInfo {
    let qualified_name = format!("{}.{}", name, service_type);
    ServiceInfo {
        application: "http".to_string(),
        domain: "local".to_string(),
        key: qualified_name.to_lowercase(),
        protocol: "tcp".to_string(),
        name: name.to_string(),
        qualified_name,
        port,
        priority: 0,
        urls: Vec::new(),
        host_addresses: Vec::new(),
    }
}

pub struct MockEngine {
    type_listeners: Mutex<Vec<(ListenerId, Arc<dyn ServiceTypeListener>)>>,
    service_listeners: Mutex<HashMap<ServiceTypeName, Vec<Arc<dyn ServiceListener>>>>,
    browsed: Mutex<Vec<ServiceTypeName>>,
    failing: Mutex<HashSet<ServiceTypeName>>,
    requested: Mutex<Vec<(ServiceTypeName, String)>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    registered_tx: flume::Sender<()>,
    registered_rx: flume::Receiver<()>,
}

impl MockEngine {
    pub fn new() -> Self {
        let (registered_tx, registered_rx) = flume::unbounded();
        Self {
            type_listeners: Mutex::new(Vec::new()),
            service_listeners: Mutex::new(HashMap::new()),
            browsed: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            requested: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            registered_tx,
            registered_rx,
        }
    }

    /// Makes `add_service_listener` fail for this type.
    pub fn fail_browse(&self, service_type: &str) {
        self.failing.lock().insert(service_type.into());
    }

    /// Blocks until a type listener has been registered.
    pub fn wait_for_type_listener(&self) {
        let _ = self.registered_rx.recv();
    }

    pub fn browsed_types(&self) -> Vec<ServiceTypeName> {
        self.browsed.lock().clone()
    }

    pub fn requested(&self) -> Vec<(ServiceTypeName, String)> {
        self.requested.lock().clone()
    }

    pub fn type_listener_count(&self) -> usize {
        self.type_listeners.lock().len()
    }

    pub fn service_listener_count(&self) -> usize {
        self.service_listeners.lock().values().map(Vec::len).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn announce_type(&self, service_type: &str) {
        let listeners: Vec<_> = self
            .type_listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        let service_type = ServiceTypeName::from(service_type);
        for listener in listeners {
            listener.service_type_added(&service_type);
        }
    }

    pub fn add_instance(&self, service_type: &str, name: &str) {
        let event = ServiceEvent::unresolved(name, service_type.into());
        for listener in self.listeners_for(&event.service_type) {
            listener.service_added(&event);
        }
    }

    pub fn remove_instance(&self, service_type: &str, name: &str) {
        let event = ServiceEvent::unresolved(name, service_type.into());
        for listener in self.listeners_for(&event.service_type) {
            listener.service_removed(&event);
        }
    }

    pub fn resolve_instance(&self, service_type: &str, name: &str, info: ServiceInfo) {
        let event = ServiceEvent::resolved(name, service_type.into(), info);
        for listener in self.listeners_for(&event.service_type) {
            listener.service_resolved(&event);
        }
    }

    fn listeners_for(&self, service_type: &ServiceTypeName) -> Vec<Arc<dyn ServiceListener>> {
        self.service_listeners
            .lock()
            .get(service_type)
            .cloned()
            .unwrap_or_default()
    }
}

impl DiscoveryEngine for MockEngine {
    fn add_service_type_listener(
        &self,
        listener: Arc<dyn ServiceTypeListener>,
    ) -> Result<ListenerId, DiscoveryError> {
        if self.is_closed() {
            return Err(DiscoveryError::Closed);
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.type_listeners.lock().push((id, listener));
        let _ = self.registered_tx.send(());
        Ok(id)
    }

    fn remove_service_type_listener(&self, id: ListenerId) {
        self.type_listeners.lock().retain(|(existing, _)| *existing != id);
    }

    fn add_service_listener(
        &self,
        service_type: &ServiceTypeName,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<(), DiscoveryError> {
        if self.failing.lock().contains(service_type) {
            return Err(DiscoveryError::Browse {
                service_type: service_type.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.browsed.lock().push(service_type.clone());
        self.service_listeners
            .lock()
            .entry(service_type.clone())
            .or_default()
            .push(listener);
        Ok(())
    }

    fn request_service_info(&self, service_type: &ServiceTypeName, instance_name: &str) {
        self.requested
            .lock()
            .push((service_type.clone(), instance_name.to_string()));
    }

    fn unregister_all_services(&self) {
        self.service_listeners.lock().clear();
    }

    fn close(&self) -> Result<(), DiscoveryError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
