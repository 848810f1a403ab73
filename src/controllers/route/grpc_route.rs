use super::{filters::grpc_filters, http_route::header_matches, resolve_backends, PartialRoute, RouteError, RouteTranslator, RuleTranslation, TranslatedRule};
use crate::common::{
    gateway_api::{
        common::{BackendObjectReference, ParentReference},
        grpcroutes::{GRPCMethodMatch, GRPCMethodMatchType, GRPCRoute, GRPCRouteRule},
    },
    route::rule_key,
    BackendResolver, PathMatch, ResourceKey, RouteBackend, RouteMatch,
};

const ANY_SEGMENT: &str = "[^/]+";

/// gRPC calls are `POST /<service>/<method>`, method matches become path matches.
fn method_path(method: &GRPCMethodMatch) -> Result<Option<PathMatch>, RouteError> {
    let service = method.service.as_deref().filter(|s| !s.is_empty());
    let name = method.method.as_deref().filter(|m| !m.is_empty());
    match method.r#type.clone().unwrap_or_default() {
        GRPCMethodMatchType::Exact => Ok(match (service, name) {
            (Some(service), Some(name)) => Some(PathMatch::Exact(format!("/{service}/{name}"))),
            (Some(service), None) => Some(PathMatch::Prefix(format!("/{service}/"))),
            (None, Some(name)) => Some(PathMatch::Regex(format!("/{ANY_SEGMENT}/{name}"))),
            (None, None) => None,
        }),
        GRPCMethodMatchType::RegularExpression => Ok(Some(PathMatch::Regex(format!(
            "/{}/{}",
            service.unwrap_or(ANY_SEGMENT),
            name.unwrap_or(ANY_SEGMENT)
        )))),
        GRPCMethodMatchType::Unsupported => Err(RouteError::UnsupportedValue("unsupported gRPC method match type".to_owned())),
    }
}

fn translate_rule(backends: &BackendResolver<'_>, key: &ResourceKey, rule_index: usize, rule: &GRPCRouteRule) -> Result<TranslatedRule, RouteError> {
    let matches = match rule.matches.as_deref() {
        None | Some([]) => vec![RouteMatch::default()],
        Some(matches) => matches
            .iter()
            .map(|grpc_match| {
                Ok(RouteMatch {
                    path: grpc_match.method.as_ref().map(method_path).transpose()?.flatten(),
                    headers: header_matches(grpc_match.headers.as_ref())?,
                    ..Default::default()
                })
            })
            .collect::<Result<_, RouteError>>()?,
    };
    let filters = grpc_filters(backends, key, rule.filters.as_deref().unwrap_or_default())?;
    let mut backend_error = filters.backend_error;

    let mut route_backends: Vec<RouteBackend> = vec![];
    for backend_ref in rule.backend_refs.iter().flatten() {
        let reference = BackendObjectReference {
            group: backend_ref.group.clone(),
            kind: backend_ref.kind.clone(),
            name: backend_ref.name.clone(),
            namespace: backend_ref.namespace.clone(),
            port: backend_ref.port,
        };
        let backend_filters = grpc_filters(backends, key, backend_ref.filters.as_deref().unwrap_or_default())?;
        let (resolved, error) = resolve_backends(backends, key, [(&reference, backend_ref.weight)])?;
        route_backends.extend(resolved.into_iter().map(|backend| RouteBackend {
            filters: backend_filters.filters.clone(),
            ..backend
        }));
        backend_error = backend_error.or(backend_filters.backend_error).or(error);
    }

    Ok(TranslatedRule {
        routes: vec![PartialRoute {
            key: rule_key(key, rule_index),
            rule_name: rule.name.clone(),
            matches,
            filters: filters.filters,
            backends: route_backends,
        }],
        backend_error,
        deprecated: filters.deprecated,
    })
}

impl RouteTranslator for GRPCRoute {
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
