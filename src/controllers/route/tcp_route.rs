use super::{resolve_backends, PartialRoute, RouteError, RouteTranslator, RuleTranslation, TranslatedRule};
use crate::common::{
    gateway_api::{
        common::{BackendObjectReference, BackendReference, ParentReference},
        tcproutes::TCPRoute,
    },
    route::rule_key,
    BackendResolver, ResourceKey, RouteMatch,
};

/// Shared by TCP and TLS rules: one catch-all route carrying the resolved backends.
pub(super) fn translate_stream_rule(
    backends: &BackendResolver<'_>,
    key: &ResourceKey,
    rule_index: usize,
    rule_name: Option<&String>,
    backend_refs: &[BackendReference],
) -> Result<TranslatedRule, RouteError> {
    let references: Vec<(BackendObjectReference, Option<i32>)> = backend_refs
        .iter()
        .map(|backend_ref| {
            (
                BackendObjectReference {
                    group: backend_ref.group.clone(),
                    kind: backend_ref.kind.clone(),
                    name: backend_ref.name.clone(),
                    namespace: backend_ref.namespace.clone(),
                    port: backend_ref.port,
                },
                backend_ref.weight,
            )
        })
        .collect();
    let (route_backends, backend_error) = resolve_backends(backends, key, references.iter().map(|(reference, weight)| (reference, *weight)))?;
    Ok(TranslatedRule {
        routes: vec![PartialRoute {
            key: rule_key(key, rule_index),
            rule_name: rule_name.cloned(),
            matches: vec![RouteMatch::default()],
            filters: vec![],
            backends: route_backends,
        }],
        backend_error,
        deprecated: None,
    })
}

impl RouteTranslator for TCPRoute {
    fn parent_refs(&self) -> &[ParentReference] {
        self.spec.parent_refs.as_deref().unwrap_or_default()
    }

    fn hostnames(&self) -> &[String] {
        &[]
    }

    fn uses_hostnames(&self) -> bool {
        false
    }

    fn translate_rules(&self, backends: &BackendResolver<'_>) -> RuleTranslation {
        let key = ResourceKey::from_resource(self);
        let mut translation = RuleTranslation::default();
        for (rule_index, rule) in self.spec.rules.iter().enumerate() {
            translation.record_rule(translate_stream_rule(backends, &key, rule_index, rule.name.as_ref(), &rule.backend_refs));
        }
        translation
    }
}
