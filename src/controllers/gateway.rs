use std::collections::BTreeSet;

use itertools::Itertools;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::utils::{namespace_matches, select_namespaces};
use crate::{
    common::{
        gateway_api::{
            gateways::{FromNamespaces, Gateway, GatewayListeners, GatewayListenersTlsMode, RouteGroupKind, RouteNamespaces},
            listenersets::XListenerSet,
        },
        references_resolver::validate_tls_secret,
        resource_key::{
            CORE_GROUP_NAME, GRPC_ROUTE_KIND_NAME, HTTP_ROUTE_KIND_NAME, LISTENER_SET_KIND_NAME, SECRET_KIND_NAME, TCP_ROUTE_KIND_NAME, TLS_ROUTE_KIND_NAME,
        },
        resources::{bind_key, listener_key},
        Bind, ConditionSet, ConditionType, GatewayStatusReport, GroupKind, Listener, ListenerStatusReport, ListenerTls, ObjectStatus, Observation, ParentInfo,
        ParentKind, ParentRegistry, ProtocolType, ReferenceGrantIndex, Resource, ResourceKey, ResourcesForGateway, StatusReport, DEFAULT_GROUP_NAME,
        DEFAULT_KIND_NAME, DEFAULT_ROUTE_HOSTNAME,
    },
    state::Snapshot,
};

/// Gateway annotation switching TLS passthrough listeners to auto passthrough.
pub const TLS_PASSTHROUGH_MODE_ANNOTATION: &str = "gateway.kubvernor.io/tls-passthrough-mode";
const AUTO_PASSTHROUGH: &str = "auto";
/// Namespace entry that no route namespace can ever match.
const NO_NAMESPACE: &str = "~";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("protocol {protocol:?} is unsupported{hint}")]
    UnsupportedProtocol { protocol: String, hint: String },
    #[error("{0}")]
    UnsupportedValue(String),
    #[error("route kinds {0} are not valid for this listener")]
    InvalidRouteKinds(String),
    #[error("{0}")]
    InvalidCertificateRef(String),
    #[error("certificate {0} is not accessible (missing a ReferenceGrant?)")]
    RefNotPermitted(String),
}

impl ListenerError {
    fn condition_type(&self) -> ConditionType {
        match self {
            ListenerError::UnsupportedProtocol { .. } | ListenerError::UnsupportedValue(_) => ConditionType::Accepted,
            ListenerError::InvalidRouteKinds(_) | ListenerError::InvalidCertificateRef(_) | ListenerError::RefNotPermitted(_) => ConditionType::ResolvedRefs,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ListenerError::UnsupportedProtocol { .. } => "UnsupportedProtocol",
            ListenerError::UnsupportedValue(_) => "UnsupportedValue",
            ListenerError::InvalidRouteKinds(_) => "InvalidRouteKinds",
            ListenerError::InvalidCertificateRef(_) => "InvalidCertificateRef",
            ListenerError::RefNotPermitted(_) => "RefNotPermitted",
        }
    }

    fn invalidates(&self) -> bool {
        !matches!(self, ListenerError::InvalidRouteKinds(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListenerConflict {
    Protocol,
    Hostname,
}

impl ListenerConflict {
    fn reason(self) -> &'static str {
        match self {
            ListenerConflict::Protocol => "ProtocolConflict",
            ListenerConflict::Hostname => "HostnameConflict",
        }
    }
}

/// Everything the Listener Builder derives for one Gateway.
#[derive(Clone, Debug)]
pub struct GatewayTranslation {
    pub fragment: ResourcesForGateway,
    pub registry: ParentRegistry,
}

#[derive(Debug)]
struct ListenerOutcome<'a> {
    owner: ResourceKey,
    spec: &'a GatewayListeners,
    protocol: Option<ProtocolType>,
    tls: Option<ListenerTls>,
    supported_kinds: Vec<RouteGroupKind>,
    hostnames: Vec<String>,
    errors: Vec<ListenerError>,
    conflict: Option<ListenerConflict>,
}

impl ListenerOutcome<'_> {
    fn is_valid(&self) -> bool {
        self.protocol.is_some()
            && self.conflict.is_none()
            && !self.supported_kinds.is_empty()
            && !self.errors.iter().any(ListenerError::invalidates)
    }

    fn original_hostname(&self) -> &str {
        self.spec.hostname.as_deref().unwrap_or_default()
    }

    fn conditions(&self) -> ConditionSet {
        let mut conditions = ConditionSet::new()
            .with(ConditionType::Accepted, Observation::healthy("Accepted", "listener accepted"))
            .with(ConditionType::ResolvedRefs, Observation::healthy("ResolvedRefs", "all references resolved"))
            .with(ConditionType::Conflicted, Observation::healthy("NoConflicts", "no conflicts"));

        let mut seen = BTreeSet::new();
        for error in &self.errors {
            if seen.insert(error.condition_type()) {
                conditions.set(error.condition_type(), Observation::error(error.reason(), error.to_string()));
            }
        }
        if let Some(conflict) = self.conflict {
            conditions.set(ConditionType::Conflicted, Observation::error(conflict.reason(), format!("listener conflicts on port {}", self.spec.port)));
        }
        if self.is_valid() {
            conditions.set(ConditionType::Programmed, Observation::healthy("Programmed", "listener programmed"));
        } else {
            conditions.set(ConditionType::Programmed, Observation::error("Invalid", "listener is invalid"));
        }
        conditions
    }

    fn status(&self) -> ListenerStatusReport {
        ListenerStatusReport {
            name: self.spec.name.clone(),
            supported_kinds: self.supported_kinds.clone(),
            attached_routes: 0,
            conditions: self.conditions(),
        }
    }
}

pub struct ListenerBuilder<'a> {
    snapshot: &'a Snapshot,
    reference_grants: &'a dyn ReferenceGrantIndex,
    gateway_class_name: &'a str,
}

impl<'a> ListenerBuilder<'a> {
    pub fn new(snapshot: &'a Snapshot, reference_grants: &'a dyn ReferenceGrantIndex, gateway_class_name: &'a str) -> Self {
        Self {
            snapshot,
            reference_grants,
            gateway_class_name,
        }
    }

    pub fn is_managed(&self, gateway: &Gateway) -> bool {
        gateway.spec.gateway_class_name == self.gateway_class_name
    }

    #[instrument(level = "debug", skip_all, fields(gateway = %gateway.name_any()))]
    pub fn build(&self, gateway: &Gateway) -> GatewayTranslation {
        let gateway_key = ResourceKey::from_resource(gateway);
        let auto_passthrough = gateway.annotations().get(TLS_PASSTHROUGH_MODE_ANNOTATION).is_some_and(|mode| mode == AUTO_PASSTHROUGH);

        let mut outcomes: Vec<ListenerOutcome<'_>> =
            gateway.spec.listeners.iter().map(|listener| self.build_listener(&gateway_key, &gateway_key, listener, auto_passthrough)).collect();

        let mut report = StatusReport::new();
        let mut accepted_listener_sets = vec![];
        for (listener_set_key, listener_set) in self.listener_sets_for(&gateway_key) {
            if self.listener_set_allowed(gateway, &listener_set_key.namespace) {
                accepted_listener_sets.push(listener_set_key.clone());
                outcomes.extend(
                    listener_set
                        .spec
                        .listeners
                        .iter()
                        .map(|listener| self.build_listener(&gateway_key, &listener_set_key, listener, auto_passthrough)),
                );
            } else {
                info!("ListenerSet {listener_set_key} is not allowed by gateway {gateway_key}");
                let conditions = ConditionSet::new()
                    .with(ConditionType::Accepted, Observation::error("NotAllowed", "ListenerSet is not allowed by the parent Gateway"))
                    .with(ConditionType::Programmed, Observation::error("NotAllowed", "ListenerSet is not allowed by the parent Gateway"));
                report.insert(
                    listener_set_key,
                    ObjectStatus::ListenerSet(GatewayStatusReport {
                        generation: listener_set.metadata.generation,
                        conditions,
                        listeners: vec![],
                    }),
                );
            }
        }

        detect_conflicts(&mut outcomes);

        let mut registry = ParentRegistry::new();
        let mut resources = vec![];
        for outcome in &outcomes {
            registry.insert(
                outcome.owner.clone(),
                ParentInfo {
                    internal_name: listener_key(&outcome.owner, &outcome.spec.name),
                    internal_kind: ParentKind::Listener,
                    parent_gateway: gateway_key.clone(),
                    parent_key: outcome.owner.clone(),
                    allowed_kinds: outcome.supported_kinds.clone(),
                    hostnames: outcome.hostnames.clone(),
                    original_hostname: outcome.original_hostname().to_owned(),
                    section_name: outcome.spec.name.clone(),
                    port: outcome.spec.port,
                    protocol: outcome.protocol,
                },
            );
            if let (true, Some(protocol)) = (outcome.is_valid(), outcome.protocol) {
                let bind = bind_key(&gateway_key, outcome.spec.port);
                resources.push(Resource::Bind(Bind {
                    key: bind.clone(),
                    port: outcome.spec.port,
                }));
                resources.push(Resource::Listener(Listener {
                    key: listener_key(&outcome.owner, &outcome.spec.name),
                    name: outcome.spec.name.clone(),
                    bind_key: bind,
                    gateway_key: gateway_key.clone(),
                    hostname: outcome.spec.hostname.clone().filter(|h| !h.is_empty()),
                    protocol,
                    tls: outcome.tls.clone(),
                }));
            } else {
                debug!("Listener {} on {} is not valid {:?}", outcome.spec.name, outcome.owner, outcome.errors);
            }
        }

        let invalid: Vec<&str> = outcomes.iter().filter(|o| o.owner == gateway_key && !o.is_valid()).map(|o| o.spec.name.as_str()).collect();
        let gateway_conditions = if invalid.is_empty() {
            ConditionSet::new()
                .with(ConditionType::Accepted, Observation::healthy("Accepted", "gateway accepted"))
                .with(ConditionType::Programmed, Observation::healthy("Programmed", "gateway programmed"))
        } else {
            let message = format!("invalid listeners: {}", invalid.join(", "));
            ConditionSet::new()
                .with(ConditionType::Accepted, Observation::healthy("ListenersNotValid", message.clone()))
                .with(ConditionType::Programmed, Observation::error("Invalid", message))
        };
        report.insert(
            gateway_key.clone(),
            ObjectStatus::Gateway(GatewayStatusReport {
                generation: gateway.metadata.generation,
                conditions: gateway_conditions,
                listeners: outcomes.iter().filter(|o| o.owner == gateway_key).map(ListenerOutcome::status).collect(),
            }),
        );

        for listener_set_key in accepted_listener_sets {
            let generation = self.snapshot.listener_sets.get(&listener_set_key).and_then(|ls| ls.metadata.generation);
            let owned: Vec<&ListenerOutcome<'_>> = outcomes.iter().filter(|o| o.owner == listener_set_key).collect();
            let programmed = if owned.iter().all(|o| o.is_valid()) {
                Observation::healthy("Programmed", "listener set programmed")
            } else {
                Observation::error("Invalid", "listener set has invalid listeners")
            };
            report.insert(
                listener_set_key,
                ObjectStatus::ListenerSet(GatewayStatusReport {
                    generation,
                    conditions: ConditionSet::new()
                        .with(ConditionType::Accepted, Observation::healthy("Accepted", "listener set accepted"))
                        .with(ConditionType::Programmed, programmed),
                    listeners: owned.iter().map(|o| o.status()).collect(),
                }),
            );
        }

        GatewayTranslation {
            fragment: ResourcesForGateway::new(gateway_key).with_resources(resources).with_report(report),
            registry,
        }
    }

    fn listener_sets_for(&self, gateway_key: &ResourceKey) -> Vec<(ResourceKey, &'a XListenerSet)> {
        self.snapshot
            .listener_sets
            .fetch()
            .filter(|(key, listener_set)| {
                let parent = &listener_set.spec.parent_ref;
                parent.group.as_deref().unwrap_or(DEFAULT_GROUP_NAME) == DEFAULT_GROUP_NAME
                    && parent.kind.as_deref().unwrap_or(DEFAULT_KIND_NAME) == DEFAULT_KIND_NAME
                    && parent.name == gateway_key.name
                    && parent.namespace.as_deref().unwrap_or(&key.namespace) == gateway_key.namespace
            })
            .sorted_by_key(|(key, listener_set)| (listener_set.metadata.creation_timestamp.as_ref().map(|t| t.0), (*key).clone()))
            .map(|(key, listener_set)| (key.clone(), &**listener_set))
            .collect()
    }

    fn listener_set_allowed(&self, gateway: &Gateway, namespace: &str) -> bool {
        let Some(RouteNamespaces { from, selector }) = gateway.spec.allowed_listeners.as_ref().and_then(|a| a.namespaces.as_ref()) else {
            return false;
        };
        match from.clone().unwrap_or(FromNamespaces::None) {
            FromNamespaces::All => true,
            FromNamespaces::Same => gateway.namespace().as_deref() == Some(namespace),
            FromNamespaces::Selector => selector.as_ref().is_some_and(|selector| namespace_matches(&self.snapshot.namespaces, selector, namespace)),
            FromNamespaces::None => false,
        }
    }

    fn build_listener<'l>(&self, gateway_key: &ResourceKey, owner: &ResourceKey, listener: &'l GatewayListeners, auto_passthrough: bool) -> ListenerOutcome<'l> {
        let mut errors = vec![];
        let protocol = match listener.protocol.parse::<ProtocolType>() {
            Ok(protocol) => Some(protocol),
            Err(protocol) => {
                let hint = protocol
                    .to_uppercase()
                    .parse::<ProtocolType>()
                    .map(|p| format!(", did you mean {:?}?", p.as_str()))
                    .unwrap_or_default();
                errors.push(ListenerError::UnsupportedProtocol { protocol, hint });
                None
            }
        };

        let mut supported_kinds = vec![];
        let mut tls = None;
        if let Some(protocol) = protocol {
            let (kinds, kinds_error) = allowed_kinds(protocol, listener);
            supported_kinds = kinds;
            errors.extend(kinds_error);
            match self.tls(gateway_key, owner, listener, protocol, auto_passthrough) {
                Ok(listener_tls) => tls = listener_tls,
                Err(e) => errors.push(e),
            }
        }

        ListenerOutcome {
            owner: owner.clone(),
            spec: listener,
            protocol,
            tls,
            supported_kinds,
            hostnames: self.hostnames(owner, listener),
            errors,
            conflict: None,
        }
    }

    fn tls(&self, gateway_key: &ResourceKey, owner: &ResourceKey, listener: &GatewayListeners, protocol: ProtocolType, auto_passthrough: bool) -> Result<Option<ListenerTls>, ListenerError> {
        if !protocol.requires_tls() {
            return Ok(None);
        }
        let Some(tls) = &listener.tls else {
            return Err(ListenerError::UnsupportedValue(format!("{protocol} listener requires a tls configuration")));
        };

        match tls.mode.clone().unwrap_or_default() {
            GatewayListenersTlsMode::Passthrough if protocol == ProtocolType::Https => {
                Err(ListenerError::UnsupportedValue("HTTPS listeners require tls mode Terminate".to_owned()))
            }
            GatewayListenersTlsMode::Passthrough => Ok(Some(if auto_passthrough { ListenerTls::AutoPassthrough } else { ListenerTls::Passthrough })),
            GatewayListenersTlsMode::Terminate => {
                let certificate_refs = tls.certificate_refs.as_deref().unwrap_or_default();
                let [certificate_ref] = certificate_refs else {
                    return Err(ListenerError::InvalidCertificateRef(format!("exactly one certificate reference is required, found {}", certificate_refs.len())));
                };
                let group = certificate_ref.group.as_deref().unwrap_or(CORE_GROUP_NAME);
                let kind = certificate_ref.kind.as_deref().unwrap_or(SECRET_KIND_NAME);
                if group != CORE_GROUP_NAME || kind != SECRET_KIND_NAME {
                    return Err(ListenerError::InvalidCertificateRef(format!("unsupported certificate reference kind {group}/{kind}")));
                }
                let secret_key =
                    ResourceKey::with_kind(CORE_GROUP_NAME, SECRET_KIND_NAME, certificate_ref.namespace.as_deref().unwrap_or(&owner.namespace), &certificate_ref.name);

                let from = if owner == gateway_key { GroupKind::new(DEFAULT_GROUP_NAME, DEFAULT_KIND_NAME) } else { GroupKind::new(&owner.group, LISTENER_SET_KIND_NAME) };
                if !self.reference_grants.allowed(&from, &owner.namespace, &GroupKind::new(CORE_GROUP_NAME, SECRET_KIND_NAME), &secret_key.namespace, &secret_key.name) {
                    return Err(ListenerError::RefNotPermitted(format!("{}/{}", secret_key.namespace, secret_key.name)));
                }
                let Some(secret) = self.snapshot.secrets.get(&secret_key) else {
                    return Err(ListenerError::InvalidCertificateRef(format!("secret {}/{} not found", secret_key.namespace, secret_key.name)));
                };
                validate_tls_secret(secret).map_err(|e| {
                    warn!("Certificate {secret_key} is invalid {e}");
                    ListenerError::InvalidCertificateRef(format!("secret {}/{}: {e}", secret_key.namespace, secret_key.name))
                })?;
                Ok(Some(ListenerTls::Terminate { certificates: vec![secret_key] }))
            }
        }
    }

    fn hostnames(&self, owner: &ResourceKey, listener: &GatewayListeners) -> Vec<String> {
        let hostname = listener.hostname.as_deref().filter(|h| !h.is_empty()).unwrap_or(DEFAULT_ROUTE_HOSTNAME);
        let namespaces = listener.allowed_routes.as_ref().and_then(|a| a.namespaces.as_ref());
        let from = namespaces.and_then(|n| n.from.clone()).unwrap_or_default();
        let selected = match from {
            FromNamespaces::All => vec!["*".to_owned()],
            FromNamespaces::Same => vec![owner.namespace.clone()],
            FromNamespaces::Selector => match namespaces.and_then(|n| n.selector.as_ref()) {
                Some(selector) => select_namespaces(&self.snapshot.namespaces, selector),
                None => vec![],
            },
            FromNamespaces::None => vec![],
        };
        if selected.is_empty() {
            vec![format!("{NO_NAMESPACE}/{hostname}")]
        } else {
            selected.into_iter().map(|namespace| format!("{namespace}/{hostname}")).collect()
        }
    }
}

fn default_kinds(protocol: ProtocolType) -> &'static [&'static str] {
    match protocol {
        ProtocolType::Http | ProtocolType::Https => &[HTTP_ROUTE_KIND_NAME, GRPC_ROUTE_KIND_NAME],
        ProtocolType::Tcp => &[TCP_ROUTE_KIND_NAME],
        ProtocolType::Tls => &[TLS_ROUTE_KIND_NAME],
    }
}

fn allowed_kinds(protocol: ProtocolType, listener: &GatewayListeners) -> (Vec<RouteGroupKind>, Option<ListenerError>) {
    let defaults = default_kinds(protocol);
    let to_kind = |kind: &str| RouteGroupKind {
        group: Some(DEFAULT_GROUP_NAME.to_owned()),
        kind: kind.to_owned(),
    };
    let configured = listener.allowed_routes.as_ref().and_then(|a| a.kinds.as_ref()).filter(|k| !k.is_empty());
    let Some(configured) = configured else {
        return (defaults.iter().map(|k| to_kind(k)).collect(), None);
    };

    let (valid, invalid): (Vec<&RouteGroupKind>, Vec<&RouteGroupKind>) =
        configured.iter().partition(|k| k.group.as_deref().unwrap_or(DEFAULT_GROUP_NAME) == DEFAULT_GROUP_NAME && defaults.contains(&k.kind.as_str()));
    let valid = valid.into_iter().map(|k| to_kind(&k.kind)).unique().collect();
    let error = if invalid.is_empty() {
        None
    } else {
        Some(ListenerError::InvalidRouteKinds(invalid.iter().map(|k| k.kind.as_str()).join(", ")))
    };
    (valid, error)
}

fn compatible(left: ProtocolType, right: ProtocolType) -> bool {
    left == right || matches!((left, right), (ProtocolType::Https, ProtocolType::Tls) | (ProtocolType::Tls, ProtocolType::Https))
}

/// Marks conflicting listeners. Within one owner both sides conflict, across owners the later listener loses.
fn detect_conflicts(outcomes: &mut [ListenerOutcome<'_>]) {
    for i in 0..outcomes.len() {
        for j in 0..i {
            let (earlier, current) = (&outcomes[j], &outcomes[i]);
            let (Some(earlier_protocol), Some(current_protocol)) = (earlier.protocol, current.protocol) else {
                continue;
            };
            if earlier.spec.port != current.spec.port || (earlier.owner != current.owner && earlier.conflict.is_some()) {
                continue;
            }
            let conflict = if !compatible(earlier_protocol, current_protocol) {
                Some(ListenerConflict::Protocol)
            } else if earlier_protocol == current_protocol && earlier.original_hostname() == current.original_hostname() {
                Some(ListenerConflict::Hostname)
            } else {
                None
            };
            if let Some(conflict) = conflict {
                let same_owner = earlier.owner == current.owner;
                outcomes[i].conflict.get_or_insert(conflict);
                if same_owner {
                    outcomes[j].conflict.get_or_insert(conflict);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{gateway_api::common::ParentReference, references_resolver::tls_secret, ParentError, ReferenceGrants},
        controllers::parents::ParentResolver,
        state::State,
    };

    pub(crate) fn gateway(yaml: &str) -> Gateway {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn build(state: &State, gateway: &Gateway) -> GatewayTranslation {
        let snapshot = state.snapshot().unwrap();
        let grants = ReferenceGrants::from_collection(&snapshot.reference_grants);
        ListenerBuilder::new(&snapshot, &grants, "kubvernor").build(gateway)
    }

    fn listener_status<'a>(translation: &'a GatewayTranslation, key: &ResourceKey, name: &str) -> &'a ListenerStatusReport {
        match translation.fragment.report().get(key) {
            Some(ObjectStatus::Gateway(report) | ObjectStatus::ListenerSet(report)) => report.listeners.iter().find(|l| l.name == name).unwrap(),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn builds_binds_listeners_and_parents() {
        let gateway = gateway(
            r#"
metadata:
  name: g
  namespace: ns
  generation: 3
spec:
  gatewayClassName: kubvernor
  listeners:
  - name: http
    port: 80
    protocol: HTTP
  - name: api
    port: 80
    protocol: HTTP
    hostname: api.example.com
    allowedRoutes:
      namespaces:
        from: All
"#,
        );
        let translation = build(&State::new(), &gateway);
        let key = ResourceKey::from_resource(&gateway);

        let resources: Vec<&Resource> = translation.fragment.resources().collect();
        assert_eq!(resources.iter().filter(|r| matches!(r, Resource::Bind(_))).count(), 1);
        assert_eq!(resources.iter().filter(|r| matches!(r, Resource::Listener(_))).count(), 2);

        let parents = translation.registry.fetch(&key);
        assert_eq!(parents.len(), 2);
        assert_eq!(parents[0].hostnames, vec!["ns/*".to_owned()]);
        assert_eq!(parents[1].hostnames, vec!["*/api.example.com".to_owned()]);
        assert_eq!(parents[0].allowed_kinds.len(), 2);

        let status = listener_status(&translation, &key, "http");
        assert_eq!(status.conditions.status_of(ConditionType::Programmed), Some("True"));
        assert_eq!(status.conditions.status_of(ConditionType::Conflicted), Some("False"));
        match translation.fragment.report().get(&key) {
            Some(ObjectStatus::Gateway(report)) => {
                assert_eq!(report.generation, Some(3));
                assert_eq!(report.conditions.status_of(ConditionType::Programmed), Some("True"));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn reports_protocol_hint_and_conflicts() {
        let gateway = gateway(
            r#"
metadata:
  name: g
  namespace: ns
spec:
  gatewayClassName: kubvernor
  listeners:
  - name: lower
    port: 8080
    protocol: http
  - name: plain
    port: 443
    protocol: HTTP
  - name: tcp
    port: 443
    protocol: TCP
  - name: dup-a
    port: 9000
    protocol: TCP
  - name: dup-b
    port: 9000
    protocol: TCP
"#,
        );
        let translation = build(&State::new(), &gateway);
        let key = ResourceKey::from_resource(&gateway);

        let lower = listener_status(&translation, &key, "lower");
        assert_eq!(lower.conditions.reason_of(ConditionType::Accepted), Some("UnsupportedProtocol"));
        assert!(lower.conditions.get(ConditionType::Accepted).unwrap().observation.message().contains("did you mean \"HTTP\""));

        assert_eq!(listener_status(&translation, &key, "plain").conditions.reason_of(ConditionType::Conflicted), Some("ProtocolConflict"));
        assert_eq!(listener_status(&translation, &key, "tcp").conditions.status_of(ConditionType::Conflicted), Some("True"));
        assert_eq!(listener_status(&translation, &key, "dup-b").conditions.reason_of(ConditionType::Conflicted), Some("HostnameConflict"));

        assert_eq!(translation.fragment.resources().count(), 0);
        let parents = translation.registry.fetch(&key);
        assert_eq!(parents.len(), 5);
        let lower = parents.iter().find(|p| p.section_name == "lower").unwrap();
        assert_eq!(lower.protocol, None);
        assert!(lower.allowed_kinds.is_empty());

        let route = ResourceKey::with_kind(DEFAULT_GROUP_NAME, HTTP_ROUTE_KIND_NAME, "ns", "r");
        let parent_ref: ParentReference = serde_yaml::from_str("name: g\nsectionName: lower").unwrap();
        let resolved = ParentResolver::new(&translation.registry).resolve(&route, &[], &[parent_ref]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].denied_reason.as_ref().map(ParentError::reason), Some("NotAllowedByListeners"));
        match translation.fragment.report().get(&key) {
            Some(ObjectStatus::Gateway(report)) => assert_eq!(report.conditions.reason_of(ConditionType::Programmed), Some("Invalid")),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn invalid_kinds_and_missing_certificates() {
        let gateway = gateway(
            r#"
metadata:
  name: g
  namespace: ns
spec:
  gatewayClassName: kubvernor
  listeners:
  - name: tcp
    port: 9000
    protocol: TCP
    allowedRoutes:
      kinds:
      - kind: HTTPRoute
      - kind: TCPRoute
  - name: https
    port: 443
    protocol: HTTPS
    tls:
      certificateRefs:
      - name: missing
  - name: passthrough
    port: 8443
    protocol: TLS
    tls:
      mode: Passthrough
"#,
        );
        let translation = build(&State::new(), &gateway);
        let key = ResourceKey::from_resource(&gateway);

        let tcp = listener_status(&translation, &key, "tcp");
        assert_eq!(tcp.conditions.reason_of(ConditionType::ResolvedRefs), Some("InvalidRouteKinds"));
        assert_eq!(tcp.supported_kinds.len(), 1);
        assert_eq!(tcp.conditions.status_of(ConditionType::Programmed), Some("True"));

        let https = listener_status(&translation, &key, "https");
        assert_eq!(https.conditions.reason_of(ConditionType::ResolvedRefs), Some("InvalidCertificateRef"));
        assert_eq!(https.conditions.status_of(ConditionType::Programmed), Some("False"));

        let passthrough = translation.fragment.resources().find_map(|r| match r {
            Resource::Listener(l) if l.name == "passthrough" => l.tls.clone(),
            _ => None,
        });
        assert_eq!(passthrough, Some(ListenerTls::Passthrough));
    }

    #[test]
    fn terminates_with_valid_certificates_and_honours_auto_passthrough() {
        let state = State::new();
        state.apply(tls_secret("ns", "cert")).unwrap();
        let gateway = gateway(
            r#"
metadata:
  name: g
  namespace: ns
  annotations:
    gateway.kubvernor.io/tls-passthrough-mode: auto
spec:
  gatewayClassName: kubvernor
  listeners:
  - name: https
    port: 443
    protocol: HTTPS
    hostname: example.com
    tls:
      certificateRefs:
      - name: cert
  - name: passthrough
    port: 8443
    protocol: TLS
    tls:
      mode: Passthrough
"#,
        );
        let translation = build(&state, &gateway);
        let key = ResourceKey::from_resource(&gateway);

        let https = listener_status(&translation, &key, "https");
        assert_eq!(https.conditions.status_of(ConditionType::ResolvedRefs), Some("True"));
        assert_eq!(https.conditions.status_of(ConditionType::Programmed), Some("True"));

        let tls_of = |name: &str| {
            translation.fragment.resources().find_map(|r| match r {
                Resource::Listener(l) if l.name == name => l.tls.clone(),
                _ => None,
            })
        };
        assert_eq!(
            tls_of("https"),
            Some(ListenerTls::Terminate {
                certificates: vec![ResourceKey::with_kind(CORE_GROUP_NAME, SECRET_KIND_NAME, "ns", "cert")]
            })
        );
        assert_eq!(tls_of("passthrough"), Some(ListenerTls::AutoPassthrough));
        match translation.fragment.report().get(&key) {
            Some(ObjectStatus::Gateway(report)) => assert_eq!(report.conditions.status_of(ConditionType::Programmed), Some("True")),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn listener_sets_need_permission() {
        let state = State::new();
        let listener_set: XListenerSet = serde_yaml::from_str(
            r#"
metadata:
  name: extra
  namespace: team
spec:
  parentRef:
    name: g
    namespace: ns
  listeners:
  - name: team-http
    port: 8080
    protocol: HTTP
"#,
        )
        .unwrap();
        let listener_set_key = ResourceKey::from_resource(&listener_set);
        state.apply(listener_set).unwrap();

        let closed = gateway(
            r#"
metadata:
  name: g
  namespace: ns
spec:
  gatewayClassName: kubvernor
  listeners: []
"#,
        );
        let translation = build(&state, &closed);
        match translation.fragment.report().get(&listener_set_key) {
            Some(ObjectStatus::ListenerSet(report)) => assert_eq!(report.conditions.reason_of(ConditionType::Accepted), Some("NotAllowed")),
            other => panic!("unexpected status {other:?}"),
        }

        let open = gateway(
            r#"
metadata:
  name: g
  namespace: ns
spec:
  gatewayClassName: kubvernor
  allowedListeners:
    namespaces:
      from: All
  listeners: []
"#,
        );
        let translation = build(&state, &open);
        let parents = translation.registry.fetch(&listener_set_key);
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].parent_gateway, ResourceKey::from_resource(&open));
        assert_eq!(parents[0].hostnames, vec!["team/*".to_owned()]);
        assert_eq!(listener_status(&translation, &listener_set_key, "team-http").conditions.status_of(ConditionType::Accepted), Some("True"));
    }
}
