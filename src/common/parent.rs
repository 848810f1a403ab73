use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use thiserror::Error;

use super::{
    gateway_api::{common::ParentReference, gateways::RouteGroupKind},
    resources::ProtocolType,
    ResourceKey,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParentKind {
    Listener,
    Service,
}

/// One admissible attachment point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentInfo {
    pub internal_name: String,
    pub internal_kind: ParentKind,
    /// Gateway whose bundle receives routes attached here.
    pub parent_gateway: ResourceKey,
    /// Object the listener is declared on: the Gateway, a ListenerSet, or the Service itself.
    pub parent_key: ResourceKey,
    pub allowed_kinds: Vec<RouteGroupKind>,
    /// `namespace/hostname` entries, namespace is `*` or `~` when nothing may attach.
    pub hostnames: Vec<String>,
    pub original_hostname: String,
    pub section_name: String,
    pub port: i32,
    /// `None` for listeners whose protocol is unsupported, nothing can attach to those.
    pub protocol: Option<ProtocolType>,
}

#[derive(Clone, Debug, Default)]
pub struct ParentRegistry {
    parents: BTreeMap<ResourceKey, Vec<ParentInfo>>,
}

impl ParentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parent under the key routes use to reference it.
    pub fn insert(&mut self, key: ResourceKey, parent: ParentInfo) {
        self.parents.entry(key).or_default().push(parent);
    }

    pub fn fetch(&self, key: &ResourceKey) -> &[ParentInfo] {
        self.parents.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ParentInfo)> {
        self.parents.iter().flat_map(|(key, parents)| parents.iter().map(move |p| (key, p)))
    }

    pub fn extend(&mut self, other: ParentRegistry) {
        for (key, parents) in other.parents {
            self.parents.entry(key).or_default().extend(parents);
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParentError {
    #[error("{0}")]
    NotAccepted(String),
    #[error("{0}")]
    NoHostname(String),
    #[error("{0}")]
    NotAllowed(String),
    #[error("{0}")]
    Conflict(String),
}

impl ParentError {
    /// Accepted condition reason written for this denial.
    pub fn reason(&self) -> &'static str {
        match self {
            ParentError::NotAccepted(_) => "NoMatchingParent",
            ParentError::NoHostname(_) => "NoMatchingListenerHostname",
            ParentError::NotAllowed(_) => "NotAllowedByListeners",
            ParentError::Conflict(_) => "ParentRefConflict",
        }
    }

    /// Higher wins when several candidates of one reference are denied.
    pub fn priority(&self) -> u8 {
        match self {
            ParentError::NotAccepted(_) => 0,
            ParentError::NoHostname(_) => 1,
            ParentError::NotAllowed(_) => 2,
            ParentError::Conflict(_) => 3,
        }
    }
}

/// Resolution of one (route, candidate parent) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteParentReference {
    pub internal_name: String,
    pub internal_kind: ParentKind,
    pub parent_gateway: ResourceKey,
    pub parent_key: ResourceKey,
    /// Original hostname of the parent listener.
    pub hostname: String,
    pub denied_reason: Option<ParentError>,
    pub banned_hostnames: BTreeSet<String>,
    pub original_reference: ParentReference,
    pub section_name: String,
    pub port: i32,
}

impl RouteParentReference {
    pub fn is_accepted(&self) -> bool {
        self.denied_reason.is_none()
    }

    pub(crate) fn denied(original_reference: &ParentReference, parent_key: ResourceKey, reason: ParentError) -> Self {
        Self {
            internal_name: String::new(),
            internal_kind: ParentKind::Listener,
            parent_gateway: parent_key.clone(),
            parent_key,
            hostname: String::new(),
            denied_reason: Some(reason),
            banned_hostnames: BTreeSet::new(),
            original_reference: original_reference.clone(),
            section_name: original_reference.section_name.clone().unwrap_or_default(),
            port: original_reference.port.unwrap_or_default(),
        }
    }
}

impl Display for RouteParentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.internal_name, self.parent_gateway)
    }
}
