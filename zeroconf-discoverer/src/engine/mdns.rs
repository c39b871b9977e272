//! `DiscoveryEngine` backed by the mdns-sd daemon.
//!
//! mdns-sd hands out one flume receiver per browse. A single pump task
//! multiplexes all of them and calls the registered listeners, so every
//! callback runs on the pump rather than on the session's main task.
//! Listeners may register more listeners from inside a callback: those
//! registrations travel through the command channel and are picked up on
//! the next turn of the loop.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use dashmap::DashSet;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo as MdnsInfo};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use shared::protocol::{DEFAULT_URL_SCHEME, TXT_PATH};
use shared::types::{ServiceEvent, ServiceInfo, ServiceInstanceKey, ServiceTypeName};
use crate::config::DiscoveryConfig;
use crate::engine::{DiscoveryEngine, ListenerId, ServiceListener, ServiceTypeListener};
use crate::error::DiscoveryError;

/// Which listeners a browse receiver feeds
#[derive(Clone)]
enum Route {
    Types,
    Instances(ServiceTypeName),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Types => f.write_str("type enumeration"),
            Route::Instances(service_type) => write!(f, "{}", service_type),
        }
    }
}

type RecvResult = (Route, flume::Receiver<MdnsEvent>, Result<MdnsEvent, flume::RecvError>);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// Each future owns a clone of its receiver and hands it back with the
/// result, so the pump can re-arm it.
fn make_recv_future(route: Route, rx: flume::Receiver<MdnsEvent>) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (route, rx, result)
    })
}

enum PumpCommand {
    AddTypeListener {
        id: ListenerId,
        listener: Arc<dyn ServiceTypeListener>,
        receiver: Option<flume::Receiver<MdnsEvent>>,
    },
    RemoveTypeListener(ListenerId),
    AddServiceListener {
        service_type: ServiceTypeName,
        listener: Arc<dyn ServiceListener>,
        receiver: Option<flume::Receiver<MdnsEvent>>,
    },
    ClearServiceListeners,
}

#[derive(Default)]
struct BrowseState {
    type_listeners: usize,
    type_browse_active: bool,
    instance_types: HashSet<ServiceTypeName>,
    closed: bool,
}

pub struct MdnsEngine {
    daemon: ServiceDaemon,
    type_query: String,
    commands: flume::Sender<PumpCommand>,
    state: Mutex<BrowseState>,
    /// Instances asked to resolve that have not resolved yet
    pending: Arc<DashSet<ServiceInstanceKey>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl MdnsEngine {
    /// Starts the mDNS daemon and the event pump. Must be called from within
    /// a tokio runtime.
    pub fn create(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::EngineInit(e.to_string()))?;

        if let Some(interface) = &config.interface {
            let interface_error = |e: mdns_sd::Error| DiscoveryError::Interface {
                interface: interface.clone(),
                reason: e.to_string(),
            };
            daemon
                .disable_interface(IfKind::All)
                .map_err(interface_error)?;
            daemon
                .enable_interface(interface.as_str())
                .map_err(interface_error)?;
        }

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        tracing::info!(
            "mDNS engine started on {} ({})",
            host,
            config.interface.as_deref().unwrap_or("all interfaces")
        );

        let (commands, commands_rx) = flume::unbounded();
        let pending = Arc::new(DashSet::new());
        let cancel = CancellationToken::new();

        tokio::spawn(run_pump(commands_rx, pending.clone(), cancel.clone()));

        Ok(Self {
            daemon,
            type_query: config.type_query.clone(),
            commands,
            state: Mutex::new(BrowseState::default()),
            pending,
            next_id: AtomicU64::new(1),
            cancel,
        })
    }

    fn send(&self, command: PumpCommand) -> Result<(), DiscoveryError> {
        self.commands.send(command).map_err(|_| DiscoveryError::Closed)
    }
}

impl DiscoveryEngine for MdnsEngine {
    fn add_service_type_listener(
        &self,
        listener: Arc<dyn ServiceTypeListener>,
    ) -> Result<ListenerId, DiscoveryError> {
        let receiver = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(DiscoveryError::Closed);
            }

            let receiver = if state.type_browse_active {
                None
            } else {
                let rx = self.daemon.browse(&self.type_query).map_err(|e| {
                    DiscoveryError::Browse {
                        service_type: self.type_query.clone(),
                        reason: e.to_string(),
                    }
                })?;
                state.type_browse_active = true;
                Some(rx)
            };
            state.type_listeners += 1;
            receiver
        };

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(PumpCommand::AddTypeListener {
            id,
            listener,
            receiver,
        })?;

        tracing::info!("Browsing service types via {}", self.type_query);
        Ok(id)
    }

    fn remove_service_type_listener(&self, id: ListenerId) {
        {
            let mut state = self.state.lock();
            state.type_listeners = state.type_listeners.saturating_sub(1);
            if state.type_listeners == 0 && state.type_browse_active {
                if let Err(e) = self.daemon.stop_browse(&self.type_query) {
                    tracing::warn!("Failed to stop browsing {}: {}", self.type_query, e);
                }
                state.type_browse_active = false;
            }
        }

        if self.send(PumpCommand::RemoveTypeListener(id)).is_err() {
            tracing::debug!("Event pump already stopped");
        }
    }

    fn add_service_listener(
        &self,
        service_type: &ServiceTypeName,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<(), DiscoveryError> {
        let receiver = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(DiscoveryError::Closed);
            }

            if state.instance_types.contains(service_type) {
                None
            } else {
                let rx = self.daemon.browse(service_type.as_str()).map_err(|e| {
                    DiscoveryError::Browse {
                        service_type: service_type.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                state.instance_types.insert(service_type.clone());
                Some(rx)
            }
        };

        self.send(PumpCommand::AddServiceListener {
            service_type: service_type.clone(),
            listener,
            receiver,
        })
    }

    fn request_service_info(&self, service_type: &ServiceTypeName, instance_name: &str) {
        // The daemon resolves browsed instances on its own; we only track
        // which ones are still outstanding.
        let key = ServiceInstanceKey::new(instance_name, service_type.clone());
        tracing::debug!("Resolution requested for {}", key);
        self.pending.insert(key);
    }

    fn unregister_all_services(&self) {
        let service_types = std::mem::take(&mut self.state.lock().instance_types);

        for service_type in &service_types {
            if let Err(e) = self.daemon.stop_browse(service_type.as_str()) {
                tracing::warn!("Failed to stop browsing {}: {}", service_type, e);
            }
        }

        if self.send(PumpCommand::ClearServiceListeners).is_err() {
            tracing::debug!("Event pump already stopped");
        }
        tracing::info!("Stopped browsing {} service types", service_types.len());
    }

    fn close(&self) -> Result<(), DiscoveryError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }

        self.cancel.cancel();

        if !self.pending.is_empty() {
            tracing::info!("{} instances never resolved", self.pending.len());
            for key in self.pending.iter() {
                tracing::debug!("Unresolved: {}", *key);
            }
        }

        self.daemon
            .shutdown()
            .map_err(|e| DiscoveryError::Shutdown(e.to_string()))?;

        Ok(())
    }
}

impl Drop for MdnsEngine {
    fn drop(&mut self) {
        if !self.state.lock().closed {
            tracing::warn!("mDNS engine dropped without close");
            self.cancel.cancel();
            let _ = self.daemon.shutdown();
        }
    }
}

/// Listener tables, owned by the pump task alone.
struct Dispatcher {
    type_listeners: Vec<(ListenerId, Arc<dyn ServiceTypeListener>)>,
    service_listeners: HashMap<ServiceTypeName, Vec<Arc<dyn ServiceListener>>>,
    seen_types: Vec<ServiceTypeName>,
    pending: Arc<DashSet<ServiceInstanceKey>>,
}

impl Dispatcher {
    fn apply(&mut self, command: PumpCommand, receivers: &mut FuturesUnordered<RecvFuture>) {
        match command {
            PumpCommand::AddTypeListener { id, listener, receiver } => {
                if let Some(rx) = receiver {
                    receivers.push(make_recv_future(Route::Types, rx));
                }
                // A late listener still hears about every type seen so far
                for service_type in &self.seen_types {
                    listener.service_type_added(service_type);
                }
                self.type_listeners.push((id, listener));
            }
            PumpCommand::RemoveTypeListener(id) => {
                self.type_listeners.retain(|(existing, _)| *existing != id);
            }
            PumpCommand::AddServiceListener { service_type, listener, receiver } => {
                if let Some(rx) = receiver {
                    tracing::debug!("Browsing instances of {}", service_type);
                    receivers.push(make_recv_future(Route::Instances(service_type.clone()), rx));
                }
                self.service_listeners
                    .entry(service_type)
                    .or_default()
                    .push(listener);
            }
            PumpCommand::ClearServiceListeners => {
                self.service_listeners.clear();
            }
        }
    }

    fn dispatch(&mut self, route: &Route, event: MdnsEvent) {
        match route {
            Route::Types => self.dispatch_type(event),
            Route::Instances(service_type) => self.dispatch_instance(service_type, event),
        }
    }

    fn dispatch_type(&mut self, event: MdnsEvent) {
        match event {
            MdnsEvent::ServiceFound(_, fullname) => {
                let service_type = ServiceTypeName::from(fullname);
                if self.seen_types.contains(&service_type) {
                    return;
                }
                self.seen_types.push(service_type.clone());
                for (_, listener) in &self.type_listeners {
                    listener.service_type_added(&service_type);
                }
            }
            MdnsEvent::ServiceResolved(_) | MdnsEvent::ServiceRemoved(_, _) => {}
            MdnsEvent::SearchStarted(query) => tracing::trace!("Search started: {}", query),
            MdnsEvent::SearchStopped(query) => tracing::debug!("Search stopped: {}", query),
        }
    }

    fn dispatch_instance(&mut self, service_type: &ServiceTypeName, event: MdnsEvent) {
        let Some(listeners) = self.service_listeners.get(service_type) else {
            return;
        };

        match event {
            MdnsEvent::ServiceFound(_, fullname) => {
                let event = ServiceEvent::unresolved(
                    instance_name(&fullname, service_type.as_str()),
                    service_type.clone(),
                );
                for listener in listeners {
                    listener.service_added(&event);
                }
            }
            MdnsEvent::ServiceResolved(info) => {
                let event = resolved_event(&info);
                self.pending.remove(&event.instance_key());
                for listener in listeners {
                    listener.service_resolved(&event);
                }
            }
            MdnsEvent::ServiceRemoved(_, fullname) => {
                let event = ServiceEvent::unresolved(
                    instance_name(&fullname, service_type.as_str()),
                    service_type.clone(),
                );
                for listener in listeners {
                    listener.service_removed(&event);
                }
            }
            MdnsEvent::SearchStarted(query) => tracing::trace!("Search started: {}", query),
            MdnsEvent::SearchStopped(query) => tracing::debug!("Search stopped: {}", query),
        }
    }
}

async fn run_pump(
    commands: flume::Receiver<PumpCommand>,
    pending: Arc<DashSet<ServiceInstanceKey>>,
    cancel: CancellationToken,
) {
    let mut dispatcher = Dispatcher {
        type_listeners: Vec::new(),
        service_listeners: HashMap::new(),
        seen_types: Vec::new(),
        pending,
    };
    let mut receivers: FuturesUnordered<RecvFuture> = FuturesUnordered::new();

    loop {
        tokio::select! {
            command = commands.recv_async() => {
                match command {
                    Ok(command) => dispatcher.apply(command, &mut receivers),
                    Err(_) => break,
                }
            }

            Some((route, rx, result)) = receivers.next() => {
                match result {
                    Ok(event) => {
                        dispatcher.dispatch(&route, event);
                        receivers.push(make_recv_future(route, rx));
                    }
                    Err(e) => {
                        tracing::debug!("Receiver for {} closed: {}", route, e);
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::debug!("mDNS event pump shutting down");
                break;
            }
        }
    }
}

/// Builds a resolved event from mdns-sd service info
fn resolved_event(info: &MdnsInfo) -> ServiceEvent {
    let service_type = info.get_type();
    let fullname = info.get_fullname();
    let name = instance_name(fullname, service_type);
    let (application, protocol, domain) = split_service_type(service_type);

    let addresses = sorted_addresses(info.get_addresses().iter().copied());
    let urls = service_urls(&addresses, info.get_port(), info.get_property_val_str(TXT_PATH));

    let service_info = ServiceInfo {
        application,
        domain,
        key: fullname.to_lowercase(),
        protocol,
        name: name.clone(),
        qualified_name: fullname.to_string(),
        port: info.get_port(),
        priority: info.get_priority(),
        urls,
        host_addresses: addresses.iter().map(|addr| format_host(*addr)).collect(),
    };

    ServiceEvent::resolved(name, ServiceTypeName::from(service_type), service_info)
}

/// "printer._http._tcp.local." under "_http._tcp.local." is "printer"
fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// Splits "_http._tcp.local." into ("http", "tcp", "local")
fn split_service_type(service_type: &str) -> (String, String, String) {
    let labels: Vec<&str> = service_type.split('.').filter(|l| !l.is_empty()).collect();
    let proto_idx = labels
        .iter()
        .position(|l| l.eq_ignore_ascii_case("_tcp") || l.eq_ignore_ascii_case("_udp"));

    match proto_idx {
        Some(idx) if idx > 0 => (
            labels[idx - 1].trim_start_matches('_').to_string(),
            labels[idx].trim_start_matches('_').to_string(),
            labels[idx + 1..].join("."),
        ),
        _ => (
            labels.first().map(|l| l.trim_start_matches('_')).unwrap_or_default().to_string(),
            String::new(),
            labels.iter().skip(1).copied().collect::<Vec<_>>().join("."),
        ),
    }
}

/// IPv4 before IPv6, each in ascending order
fn sorted_addresses(addresses: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut addresses: Vec<IpAddr> = addresses.into_iter().collect();
    addresses.sort();
    addresses
}

fn format_host(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

/// One URL per address; an absolute `path` TXT value is used as is.
fn service_urls(addresses: &[IpAddr], port: u16, path: Option<&str>) -> Vec<String> {
    let path = path.unwrap_or_default();
    // An absolute URL does not depend on the address, so it is listed once
    // rather than repeated per host address.
    if path.contains("://") {
        return vec![path.to_string()];
    }

    let path = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    addresses
        .iter()
        .map(|addr| format!("{}://{}:{}{}", DEFAULT_URL_SCHEME, format_host(*addr), port, path))
        .collect()
}
