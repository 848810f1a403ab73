use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Service;
use tracing::debug;

use super::utils::hostnames_match;
use crate::{
    common::{
        gateway_api::{common::ParentReference, gateways::RouteGroupKind},
        resource_key::{parent_reference_string, GRPC_ROUTE_KIND_NAME, HTTP_ROUTE_KIND_NAME, TCP_ROUTE_KIND_NAME, TLS_ROUTE_KIND_NAME},
        ParentError, ParentInfo, ParentKind, ParentRegistry, ProtocolType, ResourceKey, RouteParentReference, RouteRefKey, DEFAULT_GROUP_NAME,
        DEFAULT_ROUTE_HOSTNAME,
    },
    state::Collection,
};

/// Registers every Service as a parent routes can attach to directly.
pub fn service_parents(services: &Collection<Service>, domain_suffix: &str) -> ParentRegistry {
    let mut registry = ParentRegistry::new();
    for (key, _) in services.fetch() {
        registry.insert(
            key.clone(),
            ParentInfo {
                internal_name: format!("{}/{}", key.namespace, key.name),
                internal_kind: ParentKind::Service,
                parent_gateway: key.clone(),
                parent_key: key.clone(),
                allowed_kinds: [HTTP_ROUTE_KIND_NAME, GRPC_ROUTE_KIND_NAME, TCP_ROUTE_KIND_NAME, TLS_ROUTE_KIND_NAME]
                    .into_iter()
                    .map(|kind| RouteGroupKind {
                        group: Some(DEFAULT_GROUP_NAME.to_owned()),
                        kind: kind.to_owned(),
                    })
                    .collect(),
                hostnames: vec![],
                original_hostname: format!("{}.{}.svc.{domain_suffix}", key.name, key.namespace),
                section_name: String::new(),
                port: 0,
                protocol: Some(ProtocolType::Http),
            },
        );
    }
    registry
}

/// Decides which registered parents each parent reference of a route attaches to.
pub struct ParentResolver<'a> {
    registry: &'a ParentRegistry,
}

impl<'a> ParentResolver<'a> {
    pub fn new(registry: &'a ParentRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, route_key: &ResourceKey, route_hostnames: &[String], parent_refs: &[ParentReference]) -> Vec<RouteParentReference> {
        let mut resolved = vec![];
        let mut seen: Vec<RouteRefKey> = vec![];
        for parent_ref in parent_refs {
            let ref_key = RouteRefKey::from((parent_ref, route_key.namespace.clone()));
            let parents = self.registry.fetch(&ref_key.resource_key);

            if parents.is_empty() {
                debug!("Route {route_key} parent {} is not registered", ref_key.resource_key);
                resolved.push(RouteParentReference::denied(
                    parent_ref,
                    ref_key.resource_key.clone(),
                    ParentError::NotAccepted(format!("parent {} not found", ref_key.resource_key)),
                ));
                continue;
            }

            if seen.iter().any(|previous| overlaps(previous, &ref_key)) {
                debug!("Route {route_key} references parent {} more than once", ref_key.resource_key);
                resolved.push(RouteParentReference::denied(
                    parent_ref,
                    ref_key.resource_key.clone(),
                    ParentError::Conflict(format!("parent {} is already referenced by this route", ref_key.resource_key)),
                ));
                continue;
            }
            seen.push(ref_key.clone());

            for parent in parents {
                let banned_hostnames: BTreeSet<String> = parents
                    .iter()
                    .filter(|sibling| sibling.internal_name != parent.internal_name)
                    .filter(|sibling| sibling.port == parent.port && sibling.protocol == parent.protocol)
                    .map(|sibling| sibling.original_hostname.clone())
                    .filter(|hostname| !hostname.is_empty() && *hostname != parent.original_hostname)
                    .collect();

                let denied_reason = reference_allowed(parent, route_key, &ref_key, route_hostnames).err();
                debug!("Route {route_key} parent {} denied {denied_reason:?}", parent.internal_name);
                resolved.push(RouteParentReference {
                    internal_name: parent.internal_name.clone(),
                    internal_kind: parent.internal_kind,
                    parent_gateway: parent.parent_gateway.clone(),
                    parent_key: parent.parent_key.clone(),
                    hostname: parent.original_hostname.clone(),
                    denied_reason,
                    banned_hostnames,
                    original_reference: parent_ref.clone(),
                    section_name: parent.section_name.clone(),
                    port: parent.port,
                });
            }
        }
        resolved.sort_by_cached_key(|reference| parent_reference_string(&reference.original_reference));
        resolved
    }
}

fn overlaps(left: &RouteRefKey, right: &RouteRefKey) -> bool {
    left.resource_key == right.resource_key
        && (left.is_unscoped() || right.is_unscoped() || (left.section_name == right.section_name && left.port.unwrap_or_default() == right.port.unwrap_or_default()))
}

fn reference_allowed(parent: &ParentInfo, route_key: &ResourceKey, ref_key: &RouteRefKey, route_hostnames: &[String]) -> Result<(), ParentError> {
    if parent.internal_kind == ParentKind::Service {
        return Ok(());
    }

    let port = ref_key.port.unwrap_or_default();
    if port != 0 && port != parent.port {
        return Err(ParentError::NotAccepted(format!("port {port} not found")));
    }
    if let Some(section_name) = &ref_key.section_name {
        if *section_name != parent.section_name {
            return Err(ParentError::NotAccepted(format!("sectionName {section_name:?} not found")));
        }
    }

    if !parent.hostnames.is_empty() {
        let wildcard = [DEFAULT_ROUTE_HOSTNAME.to_owned()];
        let route_hostnames = if route_hostnames.is_empty() { &wildcard[..] } else { route_hostnames };
        let mut hostname_matched = false;
        let matched = route_hostnames.iter().any(|route_hostname| {
            parent.hostnames.iter().any(|entry| {
                let (namespace, hostname) = entry.split_once('/').unwrap_or(("*", entry.as_str()));
                let hostname_match = hostnames_match(hostname, route_hostname);
                hostname_matched |= hostname_match;
                hostname_match && (namespace == "*" || namespace == route_key.namespace)
            })
        });
        if !matched {
            if hostname_matched {
                return Err(ParentError::NotAllowed(format!(
                    "hostnames matched parent hostname {:?}, but namespace {:?} is not allowed by the parent",
                    parent.original_hostname, route_key.namespace
                )));
            }
            return Err(ParentError::NoHostname(format!("no hostnames matched parent hostname {:?}", parent.original_hostname)));
        }
    }

    let allowed = parent
        .allowed_kinds
        .iter()
        .any(|kind| kind.group.as_deref().unwrap_or(DEFAULT_GROUP_NAME) == route_key.group && kind.kind == route_key.kind);
    if !allowed {
        return Err(ParentError::NotAllowed(format!("kind {} is not allowed", route_key.kind)));
    }
    Ok(())
}

/// Outcome for one declared parent reference, the form written to route status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentVerdict {
    pub parent_ref: ParentReference,
    pub denied_reason: Option<ParentError>,
}

/// Collapses per-candidate results into one verdict per reference.
///
/// A reference is accepted when any candidate accepted it, otherwise the highest priority denial is kept.
pub fn parent_verdicts(references: &[RouteParentReference]) -> Vec<ParentVerdict> {
    let mut verdicts: Vec<ParentVerdict> = vec![];
    for reference in references {
        match verdicts.iter_mut().find(|v| v.parent_ref == reference.original_reference) {
            Some(verdict) => {
                verdict.denied_reason = match (verdict.denied_reason.take(), &reference.denied_reason) {
                    (None, _) | (_, None) => None,
                    (Some(current), Some(candidate)) => Some(if candidate.priority() > current.priority() { candidate.clone() } else { current }),
                };
            }
            None => verdicts.push(ParentVerdict {
                parent_ref: reference.original_reference.clone(),
                denied_reason: reference.denied_reason.clone(),
            }),
        }
    }
    verdicts
}
