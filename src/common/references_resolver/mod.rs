mod backends_resolver;
mod secrets_resolver;

use std::collections::{BTreeMap, BTreeSet};

pub use backends_resolver::{BackendError, BackendIndex, BackendResolver, KubeBackendIndex};
pub use secrets_resolver::{validate_tls_secret, CertificateError};
use tracing::debug;

use super::gateway_api::referencegrants::{ReferenceGrant, ReferenceGrantFrom, ReferenceGrantTo};
use crate::state::Collection;

#[cfg(test)]
pub(crate) use secrets_resolver::tests::tls_secret;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_owned(),
            kind: kind.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FromResourceKey {
    pub group: String,
    pub namespace: String,
    pub kind: String,
}

impl From<&ReferenceGrantFrom> for FromResourceKey {
    fn from(rk: &ReferenceGrantFrom) -> Self {
        Self {
            group: rk.group.clone(),
            namespace: rk.namespace.clone(),
            kind: rk.kind.clone(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ToResourceKey {
    pub group: String,
    pub name: Option<String>,
    pub kind: String,
}

impl From<&ReferenceGrantTo> for ToResourceKey {
    fn from(rk: &ReferenceGrantTo) -> Self {
        Self {
            group: rk.group.clone(),
            name: rk.name.clone().filter(|n| !n.is_empty()),
            kind: rk.kind.clone(),
        }
    }
}

/// Answers whether a cross-namespace reference is permitted.
pub trait ReferenceGrantIndex {
    fn allowed(&self, from: &GroupKind, from_namespace: &str, to: &GroupKind, to_namespace: &str, to_name: &str) -> bool;
}

/// Index of every `ReferenceGrant`, keyed by the namespace the grant lives in (the target namespace).
#[derive(Clone, Debug, Default)]
pub struct ReferenceGrants {
    grants: BTreeMap<String, BTreeSet<(FromResourceKey, ToResourceKey)>>,
}

impl ReferenceGrants {
    pub fn from_collection(reference_grants: &Collection<ReferenceGrant>) -> Self {
        let mut grants: BTreeMap<String, BTreeSet<(FromResourceKey, ToResourceKey)>> = BTreeMap::new();
        for (key, grant) in reference_grants.fetch() {
            let entry = grants.entry(key.namespace.clone()).or_default();
            for from in &grant.spec.from {
                for to in &grant.spec.to {
                    entry.insert((from.into(), to.into()));
                }
            }
        }
        Self { grants }
    }
}

impl ReferenceGrantIndex for ReferenceGrants {
    fn allowed(&self, from: &GroupKind, from_namespace: &str, to: &GroupKind, to_namespace: &str, to_name: &str) -> bool {
        if from_namespace == to_namespace {
            return true;
        }
        let allowed = self.grants.get(to_namespace).is_some_and(|grants| {
            grants.iter().any(|(grant_from, grant_to)| {
                grant_from.group == from.group
                    && grant_from.kind == from.kind
                    && grant_from.namespace == from_namespace
                    && grant_to.group == to.group
                    && grant_to.kind == to.kind
                    && grant_to.name.as_ref().map_or(true, |name| name == to_name)
            })
        });
        debug!("Reference {}/{from_namespace} -> {}/{to_namespace}/{to_name} allowed {allowed}", from.kind, to.kind);
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    fn grants(yaml: &str) -> ReferenceGrants {
        let state = State::new();
        let grant: ReferenceGrant = serde_yaml::from_str(yaml).unwrap();
        state.apply(grant).unwrap();
        ReferenceGrants::from_collection(&state.snapshot().unwrap().reference_grants)
    }

    #[test]
    fn cross_namespace_references_need_a_grant() {
        let index = grants(
            r#"
metadata:
  name: allow-routes
  namespace: backends
spec:
  from:
  - group: gateway.networking.k8s.io
    kind: HTTPRoute
    namespace: routes
  to:
  - group: ""
    kind: Service
    name: echo
"#,
        );
        let route = GroupKind::new("gateway.networking.k8s.io", "HTTPRoute");
        let grpc_route = GroupKind::new("gateway.networking.k8s.io", "GRPCRoute");
        let service = GroupKind::new("", "Service");

        assert!(index.allowed(&route, "routes", &service, "backends", "echo"));
        assert!(!index.allowed(&route, "routes", &service, "backends", "other"));
        assert!(!index.allowed(&grpc_route, "routes", &service, "backends", "echo"));
        assert!(!index.allowed(&route, "elsewhere", &service, "backends", "echo"));
        assert!(index.allowed(&route, "backends", &service, "backends", "anything"));
    }

    #[test]
    fn grant_without_name_allows_every_object() {
        let index = grants(
            r#"
metadata:
  name: allow-secrets
  namespace: certs
spec:
  from:
  - group: gateway.networking.k8s.io
    kind: Gateway
    namespace: infra
  to:
  - group: ""
    kind: Secret
"#,
        );
        let gateway = GroupKind::new("gateway.networking.k8s.io", "Gateway");
        let secret = GroupKind::new("", "Secret");
        assert!(index.allowed(&gateway, "infra", &secret, "certs", "tls-a"));
        assert!(index.allowed(&gateway, "infra", &secret, "certs", "tls-b"));
    }
}
