use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    str::FromStr,
};

use serde::Serialize;

use super::{route::Route, status::StatusReport, ResourceKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ProtocolType {
    Http,
    Https,
    Tcp,
    Tls,
}

impl ProtocolType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolType::Http => "HTTP",
            ProtocolType::Https => "HTTPS",
            ProtocolType::Tcp => "TCP",
            ProtocolType::Tls => "TLS",
        }
    }

    pub fn requires_tls(self) -> bool {
        matches!(self, ProtocolType::Https | ProtocolType::Tls)
    }
}

impl Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP" => Ok(ProtocolType::Http),
            "HTTPS" => Ok(ProtocolType::Https),
            "TCP" => Ok(ProtocolType::Tcp),
            "TLS" => Ok(ProtocolType::Tls),
            other => Err(other.to_owned()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ListenerTls {
    Terminate { certificates: Vec<ResourceKey> },
    Passthrough,
    AutoPassthrough,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Bind {
    pub key: String,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Listener {
    pub key: String,
    pub name: String,
    pub bind_key: String,
    pub gateway_key: ResourceKey,
    pub hostname: Option<String>,
    pub protocol: ProtocolType,
    pub tls: Option<ListenerTls>,
}

/// Opaque policy produced by a plugin, attached to its target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Policy {
    pub key: String,
    pub target: ResourceKey,
    pub config: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize)]
pub enum Resource {
    Bind(Bind),
    Listener(Listener),
    Route(Route),
    Policy(Policy),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceId {
    Bind(String),
    Listener(String),
    Route(String),
    Policy(String),
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        match self {
            Resource::Bind(bind) => ResourceId::Bind(bind.key.clone()),
            Resource::Listener(listener) => ResourceId::Listener(listener.key.clone()),
            Resource::Route(route) => ResourceId::Route(route.key.clone()),
            Resource::Policy(policy) => ResourceId::Policy(policy.key.clone()),
        }
    }
}

/// Listener identity used for attached route accounting: the owning Gateway or ListenerSet and the listener name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId {
    pub parent: ResourceKey,
    pub section_name: String,
}

pub fn bind_key(gateway: &ResourceKey, port: i32) -> String {
    format!("{}/{}:{port}", gateway.namespace, gateway.name)
}

pub fn listener_key(parent: &ResourceKey, section_name: &str) -> String {
    format!("{}/{}.{section_name}", parent.namespace, parent.name)
}

/// Configuration fragment for one gateway.
///
/// Fragments are immutable values. `merge` is a union over resources, reports and attached routes and
/// gives the same result whatever the order of the inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourcesForGateway {
    pub gateway: ResourceKey,
    resources: BTreeMap<ResourceId, Resource>,
    report: StatusReport,
    attached_routes: BTreeMap<ListenerId, BTreeSet<ResourceKey>>,
}

impl ResourcesForGateway {
    pub fn new(gateway: ResourceKey) -> Self {
        Self {
            gateway,
            resources: BTreeMap::new(),
            report: StatusReport::new(),
            attached_routes: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        insert_resource(&mut self.resources, resource);
        self
    }

    pub fn with_resources(self, resources: impl IntoIterator<Item = Resource>) -> Self {
        resources.into_iter().fold(self, ResourcesForGateway::with_resource)
    }

    pub fn with_report(mut self, report: StatusReport) -> Self {
        self.report = self.report.merge(report);
        self
    }

    pub fn with_attached_route(mut self, listener: ListenerId, route: ResourceKey) -> Self {
        self.attached_routes.entry(listener).or_default().insert(route);
        self
    }

    pub fn merge(mut self, other: ResourcesForGateway) -> ResourcesForGateway {
        if other.gateway > self.gateway {
            self.gateway = other.gateway;
        }
        for resource in other.resources.into_values() {
            insert_resource(&mut self.resources, resource);
        }
        self.report = self.report.merge(other.report);
        for (listener, routes) in other.attached_routes {
            self.attached_routes.entry(listener).or_default().extend(routes);
        }
        self
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    pub fn attached_route_count(&self, listener: &ListenerId) -> i32 {
        self.attached_routes.get(listener).map_or(0, |routes| i32::try_from(routes.len()).unwrap_or(i32::MAX))
    }

    pub fn into_parts(self) -> (ResourceKey, Vec<Resource>, StatusReport) {
        (self.gateway, self.resources.into_values().collect(), self.report)
    }

    pub fn report_mut(&mut self) -> &mut StatusReport {
        &mut self.report
    }
}

fn insert_resource(resources: &mut BTreeMap<ResourceId, Resource>, resource: Resource) {
    let id = resource.id();
    match resources.get(&id) {
        Some(existing) if existing.partial_cmp(&resource) != Some(std::cmp::Ordering::Less) => {}
        _ => {
            resources.insert(id, resource);
        }
    }
}
