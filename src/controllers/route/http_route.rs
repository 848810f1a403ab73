use super::{
    filters::{http_filters, strip_trailing_slash},
    resolve_backends, PartialRoute, RouteError, RouteTranslator, RuleTranslation, TranslatedRule,
};
use crate::common::{
    gateway_api::{
        common::{BackendObjectReference, HeaderMatch as KubeHeaderMatch, HeaderMatchType, ParentReference},
        httproutes::{HTTPRoute, HTTPRouteRule, PathMatchType, QueryParamMatchType, RouteMatch as KubeRouteMatch},
    },
    route::{route_key, HeaderMatch, QueryMatch, StringMatch},
    BackendResolver, PathMatch, ResourceKey, RouteBackend, RouteMatch,
};

const ROOT_PATH: &str = "/";

pub(super) fn header_matches(headers: Option<&Vec<KubeHeaderMatch>>) -> Result<Vec<HeaderMatch>, RouteError> {
    headers
        .into_iter()
        .flatten()
        .map(|header| {
            let value = match header.r#type.clone().unwrap_or_default() {
                HeaderMatchType::Exact => StringMatch::Exact(header.value.clone()),
                HeaderMatchType::RegularExpression => StringMatch::Regex(header.value.clone()),
                HeaderMatchType::Unsupported => return Err(RouteError::UnsupportedValue(format!("unsupported header match type for {}", header.name))),
            };
            Ok(HeaderMatch { name: header.name.clone(), value })
        })
        .collect()
}

fn route_match(kube_match: &KubeRouteMatch) -> Result<RouteMatch, RouteError> {
    let path = match &kube_match.path {
        None => PathMatch::Prefix(ROOT_PATH.to_owned()),
        Some(path) => {
            let value = path.value.as_deref().unwrap_or(ROOT_PATH);
            match path.r#type.clone().unwrap_or_default() {
                PathMatchType::Exact => PathMatch::Exact(value.to_owned()),
                PathMatchType::PathPrefix => PathMatch::Prefix(strip_trailing_slash(value).to_owned()),
                PathMatchType::RegularExpression => PathMatch::Regex(value.to_owned()),
                PathMatchType::Unsupported => return Err(RouteError::UnsupportedValue(format!("unsupported path match type for {value}"))),
            }
        }
    };

    let query = kube_match
        .query_params
        .iter()
        .flatten()
        .map(|query| {
            let value = match query.r#type.clone().unwrap_or_default() {
                QueryParamMatchType::Exact => StringMatch::Exact(query.value.clone()),
                QueryParamMatchType::RegularExpression => StringMatch::Regex(query.value.clone()),
                QueryParamMatchType::Unsupported => return Err(RouteError::UnsupportedValue(format!("unsupported query match type for {}", query.name))),
            };
            Ok(QueryMatch { name: query.name.clone(), value })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RouteMatch {
        path: Some(path),
        headers: header_matches(kube_match.headers.as_ref())?,
        query,
        method: kube_match.method.clone(),
    })
}

fn translate_rule(backends: &BackendResolver<'_>, key: &ResourceKey, rule_index: usize, rule: &HTTPRouteRule) -> Result<TranslatedRule, RouteError> {
    let matches = match rule.matches.as_deref() {
        None | Some([]) => vec![RouteMatch {
            path: Some(PathMatch::Prefix(ROOT_PATH.to_owned())),
            ..Default::default()
        }],
        Some(matches) => matches.iter().map(route_match).collect::<Result<_, _>>()?,
    };
    let filters = http_filters(backends, key, rule.filters.as_deref().unwrap_or_default())?;
    let mut backend_error = filters.backend_error;
    let mut deprecated = filters.deprecated;

    let mut route_backends: Vec<RouteBackend> = vec![];
    for backend_ref in rule.backend_refs.iter().flatten() {
        let reference = BackendObjectReference {
            group: backend_ref.group.clone(),
            kind: backend_ref.kind.clone(),
            name: backend_ref.name.clone(),
            namespace: backend_ref.namespace.clone(),
            port: backend_ref.port,
        };
        let backend_filters = http_filters(backends, key, backend_ref.filters.as_deref().unwrap_or_default())?;
        let (resolved, error) = resolve_backends(backends, key, [(&reference, backend_ref.weight)])?;
        route_backends.extend(resolved.into_iter().map(|backend| RouteBackend {
            filters: backend_filters.filters.clone(),
            ..backend
        }));
        backend_error = backend_error.or(backend_filters.backend_error).or(error);
        deprecated = deprecated.or(backend_filters.deprecated);
    }

    let routes = matches
        .into_iter()
        .enumerate()
        .map(|(match_index, route_match)| PartialRoute {
            key: route_key(key, rule_index, match_index),
            rule_name: rule.name.clone(),
            matches: vec![route_match],
            filters: filters.filters.clone(),
            backends: route_backends.clone(),
        })
        .collect();
    Ok(TranslatedRule {
        routes,
        backend_error,
        deprecated,
    })
}

impl RouteTranslator for HTTPRoute {
    fn parent_refs(&self) -> &[ParentReference] {
        self.spec.parent_refs.as_deref().unwrap_or_default()
    }

    fn hostnames(&self) -> &[String] {
        self.spec.hostnames.as_deref().unwrap_or_default()
    }

    fn translate_rules(&self, backends: &BackendResolver<'_>) -> RuleTranslation {
        let key = ResourceKey::from_resource(self);
        let mut translation = RuleTranslation::default();
        for (rule_index, rule) in self.spec.rules.iter().flatten().enumerate() {
            translation.record_rule(translate_rule(backends, &key, rule_index, rule));
        }
        translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{ConditionType, KubeBackendIndex, ReferenceGrants, RouteFilter},
        controllers::route::{
            test_support::{condition, parent_statuses, registry, routes, state},
            translate_route, TranslationContext,
        },
    };

    const GATEWAY: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: g
  namespace: ns
spec:
  gatewayClassName: kubvernor
  listeners:
  - name: http
    port: 80
    protocol: HTTP
---
apiVersion: v1
kind: Service
metadata:
  name: svc
  namespace: ns
spec:
  ports:
  - port: 80
"#;

    fn http_route(yaml: &str) -> HTTPRoute {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn translate(objects: &str, route: &HTTPRoute) -> Vec<crate::common::ResourcesForGateway> {
        let snapshot = state(objects).snapshot().unwrap();
        let registry = registry(&snapshot);
        let grants = ReferenceGrants::from_collection(&snapshot.reference_grants);
        let index = KubeBackendIndex::new(&snapshot.backends);
        let context = TranslationContext {
            registry: &registry,
            backends: BackendResolver::new(&grants, &snapshot.services, &snapshot.inference_pools, &index, "cluster.local"),
        };
        translate_route(route, &context)
    }

    #[test]
    fn gateway_and_route_end_to_end() {
        let route = http_route(
            r#"
metadata:
  name: r
  namespace: ns
  generation: 2
spec:
  parentRefs:
  - name: g
  rules:
  - matches:
    - path:
        type: PathPrefix
        value: /api
    backendRefs:
    - name: svc
      port: 80
"#,
        );
        let fragments = translate(GATEWAY, &route);
        let emitted = routes(&fragments);
        assert_eq!(emitted.len(), 1);
        let emitted = emitted[0];
        assert_eq!(emitted.key, "ns.r.0.0.http");
        assert_eq!(emitted.listener_key, "ns/g.http");
        assert_eq!(emitted.hostnames, vec!["*".to_owned()]);
        assert_eq!(emitted.matches.len(), 1);
        assert_eq!(emitted.matches[0].path, Some(PathMatch::Prefix("/api".to_owned())));
        assert_eq!(emitted.backends.len(), 1);
        assert_eq!(emitted.backends[0].weight, 1);
        assert_eq!(emitted.backends[0].backend.hostname(), "svc.ns.svc.cluster.local");

        let key = ResourceKey::from_resource(&route);
        let statuses = parent_statuses(&fragments, &key);
        assert_eq!(statuses.len(), 1);
        assert_eq!(condition(&statuses[0], ConditionType::Accepted), ("True", "Accepted".to_owned()));
        assert_eq!(condition(&statuses[0], ConditionType::ResolvedRefs), ("True", "ResolvedRefs".to_owned()));

        let gateway_key = ResourceKey::with_kind("gateway.networking.k8s.io", "Gateway", "ns", "g");
        assert_eq!(fragments[0].gateway, gateway_key);
        assert_eq!(
            fragments[0].attached_route_count(&crate::common::ListenerId {
                parent: gateway_key,
                section_name: "http".to_owned(),
            }),
            1
        );
    }

    #[test]
    fn missing_backend_is_dropped_gracefully() {
        let route = http_route(
            r#"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  rules:
  - backendRefs:
    - name: svc
      port: 80
    - name: ghost
      port: 80
"#,
        );
        let fragments = translate(GATEWAY, &route);
        let emitted = routes(&fragments);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].backends.len(), 1);
        assert_eq!(emitted[0].matches[0].path, Some(PathMatch::Prefix("/".to_owned())));

        let statuses = parent_statuses(&fragments, &ResourceKey::from_resource(&route));
        assert_eq!(condition(&statuses[0], ConditionType::Accepted).0, "True");
        assert_eq!(condition(&statuses[0], ConditionType::ResolvedRefs), ("False", "BackendNotFound".to_owned()));
    }

    #[test]
    fn rules_split_per_match_and_normalize_prefixes() {
        let route = http_route(
            r#"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  rules:
  - matches:
    - path:
        value: /foo/
    - path:
        type: PathPrefix
        value: /
      method: GET
      headers:
      - name: x-version
        value: "2"
      queryParams:
      - type: RegularExpression
        name: q
        value: "^a.*"
    filters:
    - type: URLRewrite
      urlRewrite:
        path:
          type: ReplacePrefixMatch
          replacePrefixMatch: /bar/
    backendRefs:
    - name: svc
      port: 80
      weight: 0
"#,
        );
        let fragments = translate(GATEWAY, &route);
        let mut emitted = routes(&fragments);
        emitted.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].key, "ns.r.0.0.http");
        assert_eq!(emitted[0].matches[0].path, Some(PathMatch::Prefix("/foo".to_owned())));
        assert_eq!(emitted[1].key, "ns.r.0.1.http");
        assert_eq!(emitted[1].matches[0].path, Some(PathMatch::Prefix("/".to_owned())));
        assert_eq!(emitted[1].matches[0].method.as_deref(), Some("GET"));
        assert_eq!(emitted[1].matches[0].headers[0].value, StringMatch::Exact("2".to_owned()));
        assert_eq!(emitted[1].matches[0].query[0].value, StringMatch::Regex("^a.*".to_owned()));
        assert!(emitted[0].backends.is_empty());
        assert!(matches!(
            &emitted[0].filters[0],
            RouteFilter::UrlRewrite { path: Some(crate::common::route::PathRewrite::Prefix(prefix)), .. } if prefix == "/bar"
        ));
    }

    #[test]
    fn fatal_rule_errors_reject_the_rule() {
        let route = http_route(
            r#"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  rules:
  - backendRefs:
    - name: svc.ns
      port: 80
  - backendRefs:
    - name: svc
      port: 80
"#,
        );
        let fragments = translate(GATEWAY, &route);
        let emitted = routes(&fragments);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].key, "ns.r.1.0.http");

        let statuses = parent_statuses(&fragments, &ResourceKey::from_resource(&route));
        assert_eq!(condition(&statuses[0], ConditionType::Accepted), ("False", "UnsupportedValue".to_owned()));
    }

    #[test]
    fn foreign_routes_are_ignored_and_unknown_parents_reported() {
        let foreign = http_route(
            r#"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: other
"#,
        );
        assert!(translate(GATEWAY, &foreign).is_empty());

        let mixed = http_route(
            r#"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  - name: other
"#,
        );
        let fragments = translate(GATEWAY, &mixed);
        let statuses = parent_statuses(&fragments, &ResourceKey::from_resource(&mixed));
        assert_eq!(statuses.len(), 2);
        let other = statuses.iter().find(|s| s.parent_ref.name == "other").unwrap();
        assert_eq!(condition(other, ConditionType::Accepted), ("False", "NoMatchingParent".to_owned()));
    }

    #[test]
    fn mirror_with_both_percent_and_fraction_is_deprecated() {
        let route = http_route(
            r#"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  rules:
  - filters:
    - type: RequestMirror
      requestMirror:
        backendRef:
          name: svc
          port: 80
        percent: 10
        fraction:
          numerator: 1
          denominator: 2
    backendRefs:
    - name: svc
      port: 80
"#,
        );
        let fragments = translate(GATEWAY, &route);
        let emitted = routes(&fragments);
        assert!(matches!(emitted[0].filters[0], RouteFilter::RequestMirror { percentage, .. } if (percentage - 10.0).abs() < f64::EPSILON));
        let statuses = parent_statuses(&fragments, &ResourceKey::from_resource(&route));
        assert_eq!(condition(&statuses[0], ConditionType::Accepted), ("True", "DeprecatedField".to_owned()));
    }
}
