use serde::Serialize;

use super::ResourceKey;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StringMatch {
    Exact(String),
    Regex(String),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct HeaderMatch {
    pub name: String,
    pub value: StringMatch,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct QueryMatch {
    pub name: String,
    pub value: StringMatch,
}

/// A single protocol neutral match. All `None`/empty means match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RouteMatch {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub query: Vec<QueryMatch>,
    pub method: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct HeaderModifier {
    pub set: Vec<(String, String)>,
    pub add: Vec<(String, String)>,
    pub remove: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PathRewrite {
    Full(String),
    Prefix(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Redirect {
    pub scheme: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<i32>,
    pub path: Option<PathRewrite>,
    pub status: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize)]
pub enum RouteFilter {
    RequestHeaderModifier(HeaderModifier),
    ResponseHeaderModifier(HeaderModifier),
    RequestRedirect(Redirect),
    UrlRewrite { hostname: Option<String>, path: Option<PathRewrite> },
    RequestMirror { backend: BackendPointer, percentage: f64 },
    Cors(CorsPolicy),
}

/// Where traffic for a resolved backend goes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum BackendPointer {
    Service { hostname: String, port: i32 },
    InferencePool { hostname: String, port: i32 },
    Backend { key: ResourceKey, hostname: String, port: i32 },
}

impl BackendPointer {
    pub fn hostname(&self) -> &str {
        match self {
            BackendPointer::Service { hostname, .. } | BackendPointer::InferencePool { hostname, .. } | BackendPointer::Backend { hostname, .. } => hostname,
        }
    }

    pub fn port(&self) -> i32 {
        match self {
            BackendPointer::Service { port, .. } | BackendPointer::InferencePool { port, .. } | BackendPointer::Backend { port, .. } => *port,
        }
    }
}

#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize)]
pub struct RouteBackend {
    pub weight: i32,
    pub backend: BackendPointer,
    pub filters: Vec<RouteFilter>,
}

/// Protocol neutral route produced for one rule (and one match for HTTP) on one listener.
#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize)]
pub struct Route {
    pub key: String,
    pub route_key: ResourceKey,
    pub listener_key: String,
    pub rule_name: Option<String>,
    pub hostnames: Vec<String>,
    pub matches: Vec<RouteMatch>,
    pub filters: Vec<RouteFilter>,
    pub backends: Vec<RouteBackend>,
}

/// `<namespace>.<name>.<rule>.<match>` with the listener section appended by the driver.
pub fn route_key(route_key: &ResourceKey, rule_index: usize, match_index: usize) -> String {
    format!("{}.{}.{rule_index}.{match_index}", route_key.namespace, route_key.name)
}

/// `<namespace>.<name>.<rule>` for kinds that emit one route per rule.
pub fn rule_key(route_key: &ResourceKey, rule_index: usize) -> String {
    format!("{}.{}.{rule_index}", route_key.namespace, route_key.name)
}
