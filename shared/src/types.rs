use std::fmt;
use chrono::{DateTime, Utc};

/// A DNS-SD service type, e.g. "_http._tcp.local."
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceTypeName(String);

impl ServiceTypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceTypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ServiceTypeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Identifies one instance within a service type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInstanceKey {
    /// Instance label, e.g. "printer"
    pub name: String,
    pub service_type: ServiceTypeName,
}

impl ServiceInstanceKey {
    pub fn new(name: impl Into<String>, service_type: ServiceTypeName) -> Self {
        Self {
            name: name.into(),
            service_type,
        }
    }

    /// Full DNS-SD instance name, e.g. "printer._http._tcp.local."
    pub fn fullname(&self) -> String {
        format!("{}.{}", self.name, self.service_type)
    }
}

impl fmt::Display for ServiceInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.service_type)
    }
}

/// Metadata the engine attaches to an event once an instance is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Application protocol label without underscore, e.g. "http"
    pub application: String,

    /// Domain without trailing dot, e.g. "local"
    pub domain: String,

    /// Lowercased qualified name, stable across case variants
    pub key: String,

    /// Transport label, "tcp" or "udp"
    pub protocol: String,

    pub name: String,

    /// Full instance name, e.g. "printer._http._tcp.local."
    pub qualified_name: String,

    pub port: u16,

    pub priority: u16,

    pub urls: Vec<String>,

    pub host_addresses: Vec<String>,
}

/// A discovery callback envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub name: String,
    pub service_type: ServiceTypeName,
    /// Present only when the engine has resolved the instance
    pub info: Option<ServiceInfo>,
}

impl ServiceEvent {
    pub fn unresolved(name: impl Into<String>, service_type: ServiceTypeName) -> Self {
        Self {
            name: name.into(),
            service_type,
            info: None,
        }
    }

    pub fn resolved(name: impl Into<String>, service_type: ServiceTypeName, info: ServiceInfo) -> Self {
        Self {
            name: name.into(),
            service_type,
            info: Some(info),
        }
    }

    pub fn instance_key(&self) -> ServiceInstanceKey {
        ServiceInstanceKey::new(self.name.clone(), self.service_type.clone())
    }
}

/// A fully resolved service, as captured during a discovery session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedServiceRecord {
    /// Instance name from the event envelope
    pub name: String,

    /// Service type from the event envelope
    pub service_type: ServiceTypeName,

    pub info: ServiceInfo,

    /// When the resolution was captured; logged, not part of the report
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedServiceRecord {
    /// Builds a record from a resolved event. Returns `None` when the event
    /// carries no metadata, i.e. the instance is not resolved.
    pub fn from_event(event: &ServiceEvent) -> Option<Self> {
        let info = event.info.as_ref()?;

        Some(Self {
            name: event.name.clone(),
            service_type: event.service_type.clone(),
            info: info.clone(),
            resolved_at: Utc::now(),
        })
    }

    pub fn key(&self) -> &str {
        &self.info.key
    }
}
