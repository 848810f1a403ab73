mod filters;
pub mod grpc_route;
pub mod http_route;
pub mod tcp_route;
pub mod tls_route;

use std::collections::BTreeMap;

use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::{
    parents::{parent_verdicts, ParentResolver},
    utils::HostnameMatchFilter,
};
use crate::common::{
    gateway_api::common::{BackendObjectReference, ParentReference},
    resources::listener_key,
    BackendError, BackendResolver, ConditionSet, ConditionType, ListenerId, ObjectStatus, Observation, ParentKind, ParentRegistry, Resource, ResourceKey,
    ResourcesForGateway, Route, RouteBackend, RouteFilter, RouteMatch, RouteParentReference, RouteParentStatusReport, RouteRefKey, RouteStatusReport,
    StatusReport,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("{0}")]
    UnsupportedValue(String),
    #[error("{0}")]
    IncompatibleFilters(String),
    #[error("{0}")]
    Backend(#[from] BackendError),
}

impl RouteError {
    pub fn reason(&self) -> &'static str {
        match self {
            RouteError::UnsupportedValue(_) => "UnsupportedValue",
            RouteError::IncompatibleFilters(_) => "IncompatibleFilters",
            RouteError::Backend(e) => e.reason(),
        }
    }
}

/// One rule (or one match of an HTTP rule) translated independently of the listener it lands on.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialRoute {
    pub key: String,
    pub rule_name: Option<String>,
    pub matches: Vec<RouteMatch>,
    pub filters: Vec<RouteFilter>,
    pub backends: Vec<RouteBackend>,
}

/// Every rule of a route: what translated, and the first error of each class.
#[derive(Debug, Default)]
pub struct RuleTranslation {
    pub routes: Vec<PartialRoute>,
    pub rule_error: Option<RouteError>,
    pub backend_error: Option<BackendError>,
    pub deprecated: Option<String>,
}

impl RuleTranslation {
    pub(crate) fn record_rule(&mut self, rule: Result<TranslatedRule, RouteError>) {
        match rule {
            Ok(rule) => {
                self.routes.extend(rule.routes);
                if self.backend_error.is_none() {
                    self.backend_error = rule.backend_error;
                }
                if self.deprecated.is_none() {
                    self.deprecated = rule.deprecated;
                }
            }
            Err(e) => {
                debug!("Rule dropped {e}");
                self.rule_error.get_or_insert(e);
            }
        }
    }
}

/// Output of a single rule.
#[derive(Debug, Default)]
pub(crate) struct TranslatedRule {
    pub routes: Vec<PartialRoute>,
    pub backend_error: Option<BackendError>,
    pub deprecated: Option<String>,
}

/// Resolves the backends of one rule.
///
/// Non fatal failures drop the backend and the first one is returned alongside, a fatal failure drops the rule.
pub(crate) fn resolve_backends<'r>(
    backends: &BackendResolver<'_>,
    route: &ResourceKey,
    references: impl IntoIterator<Item = (&'r BackendObjectReference, Option<i32>)>,
) -> Result<(Vec<RouteBackend>, Option<BackendError>), RouteError> {
    let mut resolved = vec![];
    let mut first_error = None;
    for (reference, weight) in references {
        match backends.resolve(route, reference, weight) {
            (_, Some(e)) if e.is_fatal() => return Err(RouteError::Backend(e)),
            (backend, error) => {
                resolved.extend(backend);
                if first_error.is_none() {
                    first_error = error;
                }
            }
        }
    }
    Ok((resolved, first_error))
}

/// Per protocol view of a route object used by the shared driver.
pub trait RouteTranslator: kube::Resource<DynamicType = ()> {
    fn parent_refs(&self) -> &[ParentReference];

    fn hostnames(&self) -> &[String];

    /// Whether emitted routes carry hostnames at all.
    fn uses_hostnames(&self) -> bool {
        true
    }

    fn translate_rules(&self, backends: &BackendResolver<'_>) -> RuleTranslation;
}

pub struct TranslationContext<'a> {
    pub registry: &'a ParentRegistry,
    pub backends: BackendResolver<'a>,
}

/// Translates one route object into fragments, one per gateway it resolves to.
///
/// Routes whose parent references hit no registered parent belong to another controller and produce nothing.
#[instrument(level = "debug", skip_all, fields(route = %route.name_any()))]
pub fn translate_route<R: RouteTranslator>(route: &R, context: &TranslationContext<'_>) -> Vec<ResourcesForGateway> {
    let key = ResourceKey::from_resource(route);
    let parent_refs = route.parent_refs();
    let ours = parent_refs
        .iter()
        .any(|parent_ref| !context.registry.fetch(&RouteRefKey::from((parent_ref, key.namespace.clone())).resource_key).is_empty());
    if !ours {
        debug!("Route {key} has no parents managed here");
        return vec![];
    }

    let parents = ParentResolver::new(context.registry).resolve(&key, route.hostnames(), parent_refs);
    let translation = route.translate_rules(&context.backends);
    let report = route_report(&key, route.meta().generation, &parents, &translation);

    let mut attachments: BTreeMap<ResourceKey, (Vec<Resource>, Vec<ListenerId>)> = BTreeMap::new();
    for parent in parents.iter().filter(|p| !p.internal_name.is_empty()) {
        let (resources, listeners) = attachments.entry(parent.parent_gateway.clone()).or_default();
        if !parent.is_accepted() {
            continue;
        }

        let hostnames = if route.uses_hostnames() {
            let hostnames: Vec<String> = HostnameMatchFilter::new(&parent.hostname, route.hostnames())
                .effective_hostnames()
                .into_iter()
                .filter(|hostname| !parent.banned_hostnames.contains(hostname))
                .collect();
            if hostnames.is_empty() {
                info!("Route {key} has no hostnames left on {parent}");
                continue;
            }
            hostnames
        } else {
            vec![]
        };

        let (listener, section) = match parent.internal_kind {
            ParentKind::Listener => (listener_key(&parent.parent_key, &parent.section_name), parent.section_name.as_str()),
            ParentKind::Service => (parent.internal_name.clone(), parent.parent_key.name.as_str()),
        };
        resources.extend(translation.routes.iter().map(|partial| {
            Resource::Route(Route {
                key: format!("{}.{section}", partial.key),
                route_key: key.clone(),
                listener_key: listener.clone(),
                rule_name: partial.rule_name.clone(),
                hostnames: hostnames.clone(),
                matches: partial.matches.clone(),
                filters: partial.filters.clone(),
                backends: partial.backends.clone(),
            })
        }));
        listeners.push(ListenerId {
            parent: parent.parent_key.clone(),
            section_name: parent.section_name.clone(),
        });
    }

    attachments
        .into_iter()
        .map(|(gateway, (resources, listeners))| {
            listeners.into_iter().fold(
                ResourcesForGateway::new(gateway).with_resources(resources).with_report(report.clone()),
                |fragment, listener| fragment.with_attached_route(listener, key.clone()),
            )
        })
        .collect()
}

fn route_report(key: &ResourceKey, generation: Option<i64>, parents: &[RouteParentReference], translation: &RuleTranslation) -> StatusReport {
    let resolved_refs = match &translation.backend_error {
        Some(e) => Observation::error(e.reason(), e.to_string()),
        None => Observation::healthy("ResolvedRefs", "all references resolved"),
    };
    let statuses = parent_verdicts(parents)
        .into_iter()
        .map(|verdict| {
            let accepted = match (&verdict.denied_reason, &translation.rule_error, &translation.deprecated) {
                (Some(denied), _, _) => Observation::error(denied.reason(), denied.to_string()),
                (None, Some(e), _) => Observation::error(e.reason(), e.to_string()),
                (None, None, Some(deprecated)) => Observation::healthy("DeprecatedField", deprecated.clone()),
                (None, None, None) => Observation::healthy("Accepted", "route accepted"),
            };
            RouteParentStatusReport {
                parent_ref: verdict.parent_ref,
                conditions: ConditionSet::new()
                    .with(ConditionType::Accepted, accepted)
                    .with(ConditionType::ResolvedRefs, resolved_refs.clone()),
            }
        })
        .collect();

    let mut report = StatusReport::new();
    report.insert(
        key.clone(),
        ObjectStatus::Route(RouteStatusReport {
            generation,
            parents: statuses,
        }),
    );
    report
}

#[cfg(test)]
pub(crate) mod test_support {
    use k8s_openapi::api::core::v1::Service;

    use crate::{
        common::{Condition, ConditionType, ObjectStatus, ReferenceGrants, Resource, ResourceKey, ResourcesForGateway, Route, RouteParentStatusReport},
        controllers::{gateway::ListenerBuilder, parents::service_parents},
        state::{Snapshot, State},
    };

    pub fn state(objects: &str) -> State {
        let state = State::new();
        for document in objects.split("\n---\n").filter(|d| !d.trim().is_empty()) {
            let value: serde_yaml::Value = serde_yaml::from_str(document).unwrap();
            match value.get("kind").and_then(serde_yaml::Value::as_str) {
                Some("Gateway") => state.apply(serde_yaml::from_value::<crate::common::gateway_api::gateways::Gateway>(value).unwrap()).unwrap(),
                Some("Service") => state.apply(serde_yaml::from_value::<Service>(value).unwrap()).unwrap(),
                Some("ReferenceGrant") => state
                    .apply(serde_yaml::from_value::<crate::common::gateway_api::referencegrants::ReferenceGrant>(value).unwrap())
                    .unwrap(),
                Some("HTTPRoute") => state.apply(serde_yaml::from_value::<crate::common::gateway_api::httproutes::HTTPRoute>(value).unwrap()).unwrap(),
                Some("TCPRoute") => state.apply(serde_yaml::from_value::<crate::common::gateway_api::tcproutes::TCPRoute>(value).unwrap()).unwrap(),
                other => panic!("unexpected fixture kind {other:?}"),
            };
        }
        state
    }

    pub fn registry(snapshot: &Snapshot) -> crate::common::ParentRegistry {
        let grants = ReferenceGrants::from_collection(&snapshot.reference_grants);
        let builder = ListenerBuilder::new(snapshot, &grants, "kubvernor");
        let mut registry = service_parents(&snapshot.services, "cluster.local");
        for (_, gateway) in snapshot.gateways.fetch() {
            registry.extend(builder.build(gateway).registry);
        }
        registry
    }

    pub fn routes(fragments: &[ResourcesForGateway]) -> Vec<&Route> {
        fragments
            .iter()
            .flat_map(ResourcesForGateway::resources)
            .filter_map(|r| match r {
                Resource::Route(route) => Some(route),
                _ => None,
            })
            .collect()
    }

    pub fn parent_statuses(fragments: &[ResourcesForGateway], key: &ResourceKey) -> Vec<RouteParentStatusReport> {
        match fragments.iter().find_map(|f| f.report().get(key)) {
            Some(ObjectStatus::Route(report)) => report.parents.clone(),
            other => panic!("unexpected status {other:?}"),
        }
    }

    pub fn condition(status: &RouteParentStatusReport, condition_type: ConditionType) -> (&'static str, String) {
        let condition: &Condition = status.conditions.get(condition_type).unwrap();
        (condition.status(condition_type), condition.observation.reason().to_owned())
    }
}
