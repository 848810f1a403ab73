use super::{tcp_route::translate_stream_rule, RouteTranslator, RuleTranslation};
use crate::common::{
    gateway_api::{common::ParentReference, tlsroutes::TLSRoute},
    BackendResolver, ResourceKey,
};

impl RouteTranslator for TLSRoute {
    fn parent_refs(&self) -> &[ParentReference] {
        self.spec.parent_refs.as_deref().unwrap_or_default()
    }

    fn hostnames(&self) -> &[String] {
        self.spec.hostnames.as_deref().unwrap_or_default()
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
