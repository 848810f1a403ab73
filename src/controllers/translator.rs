use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    gateway::{GatewayTranslation, ListenerBuilder},
    parents::service_parents,
    policy::PolicyPlugin,
    route::{translate_route, RouteTranslator, TranslationContext},
};
use crate::{
    common::{
        gateway_api::{grpcroutes::GRPCRoute, httproutes::HTTPRoute, tcproutes::TCPRoute, tlsroutes::TLSRoute},
        BackendResolver, KubeBackendIndex, ReferenceGrants, ResourceKey, ResourcesForGateway,
    },
    state::{Collection, Derived, InputVersion, Revision, Snapshot, StorageError},
};

type Fragments = Vec<ResourcesForGateway>;

/// Turns a snapshot into per gateway fragments.
///
/// Gateway and route outputs are memoized by object key and the revisions of everything they read, so a
/// pass only recomputes objects whose inputs moved.
pub struct Translator {
    gateway_class_name: String,
    domain_suffix: String,
    plugins: Vec<Arc<dyn PolicyPlugin>>,
    gateways: Derived<ResourceKey, GatewayTranslation>,
    http_routes: Derived<ResourceKey, Fragments>,
    grpc_routes: Derived<ResourceKey, Fragments>,
    tcp_routes: Derived<ResourceKey, Fragments>,
    tls_routes: Derived<ResourceKey, Fragments>,
}

impl Translator {
    pub fn new(gateway_class_name: &str, domain_suffix: &str) -> Self {
        Self {
            gateway_class_name: gateway_class_name.to_owned(),
            domain_suffix: domain_suffix.to_owned(),
            plugins: vec![],
            gateways: Derived::default(),
            http_routes: Derived::default(),
            grpc_routes: Derived::default(),
            tcp_routes: Derived::default(),
            tls_routes: Derived::default(),
        }
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<dyn PolicyPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    #[instrument(level = "debug", skip_all, fields(revision = snapshot.revision()))]
    pub fn translate(&self, snapshot: &Snapshot) -> Result<Vec<ResourcesForGateway>, StorageError> {
        let grants = ReferenceGrants::from_collection(&snapshot.reference_grants);
        let builder = ListenerBuilder::new(snapshot, &grants, &self.gateway_class_name);

        let gateway_inputs = [
            snapshot.listener_sets.revision(),
            snapshot.secrets.revision(),
            snapshot.namespaces.revision(),
            snapshot.reference_grants.revision(),
        ];
        self.gateways.retain(|key| snapshot.gateways.get(key).is_some_and(|gateway| builder.is_managed(gateway)))?;

        let mut registry = service_parents(&snapshot.services, &self.domain_suffix);
        let mut fragments = vec![];
        for (key, gateway) in snapshot.gateways.fetch().filter(|(_, gateway)| builder.is_managed(gateway)) {
            let version = InputVersion::new(snapshot.gateways.item_revision(key).into_iter().chain(gateway_inputs));
            let translation = self.gateways.get_or_compute(key, &version, || builder.build(gateway))?;
            registry.extend(translation.registry);
            fragments.push(translation.fragment);
        }

        let index = KubeBackendIndex::new(&snapshot.backends);
        let context = TranslationContext {
            registry: &registry,
            backends: BackendResolver::new(&grants, &snapshot.services, &snapshot.inference_pools, &index, &self.domain_suffix),
        };
        let route_inputs = [
            snapshot.gateways.revision(),
            snapshot.listener_sets.revision(),
            snapshot.namespaces.revision(),
            snapshot.secrets.revision(),
            snapshot.services.revision(),
            snapshot.inference_pools.revision(),
            snapshot.backends.revision(),
            snapshot.reference_grants.revision(),
        ];
        fragments.extend(translate_routes::<HTTPRoute>(&self.http_routes, &snapshot.http_routes, &route_inputs, &context)?);
        fragments.extend(translate_routes::<GRPCRoute>(&self.grpc_routes, &snapshot.grpc_routes, &route_inputs, &context)?);
        fragments.extend(translate_routes::<TCPRoute>(&self.tcp_routes, &snapshot.tcp_routes, &route_inputs, &context)?);
        fragments.extend(translate_routes::<TLSRoute>(&self.tls_routes, &snapshot.tls_routes, &route_inputs, &context)?);

        for plugin in &self.plugins {
            let produced = plugin.translate(snapshot, &registry);
            debug!("Policy plugin {} produced {} fragments", plugin.name(), produced.len());
            fragments.extend(produced);
        }
        Ok(fragments)
    }
}

fn translate_routes<R: RouteTranslator>(
    cache: &Derived<ResourceKey, Fragments>,
    routes: &Collection<R>,
    inputs: &[Revision],
    context: &TranslationContext<'_>,
) -> Result<Fragments, StorageError> {
    cache.retain(|key| routes.get(key).is_some())?;
    let mut fragments = vec![];
    for (key, route) in routes.fetch() {
        let version = InputVersion::new(routes.item_revision(key).into_iter().chain(inputs.iter().copied()));
        fragments.extend(cache.get_or_compute(key, &version, || translate_route(&**route, context))?);
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{ConditionType, ObjectStatus, Resource},
        controllers::{
            policy::tests::ListenerCountPolicy,
            route::test_support::{condition, parent_statuses, state},
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
"#;

    const ROUTE: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  rules:
  - backendRefs:
    - name: svc
      port: 8080
"#;

    const SERVICE: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: svc
  namespace: ns
"#;

    fn route_key() -> ResourceKey {
        ResourceKey::with_kind("gateway.networking.k8s.io", "HTTPRoute", "ns", "r")
    }

    #[test]
    fn recomputes_when_dependencies_change() {
        let state = state(&format!("{GATEWAY}\n---\n{ROUTE}"));
        let translator = Translator::new("kubvernor", "cluster.local");

        let fragments = translator.translate(&state.snapshot().unwrap()).unwrap();
        let statuses = parent_statuses(&fragments, &route_key());
        assert_eq!(condition(&statuses[0], ConditionType::ResolvedRefs), ("False", "BackendNotFound".to_owned()));

        let unchanged = translator.translate(&state.snapshot().unwrap()).unwrap();
        assert_eq!(unchanged, fragments);

        state.apply(serde_yaml::from_str::<k8s_openapi::api::core::v1::Service>(SERVICE).unwrap()).unwrap();
        let fragments = translator.translate(&state.snapshot().unwrap()).unwrap();
        let statuses = parent_statuses(&fragments, &route_key());
        assert_eq!(condition(&statuses[0], ConditionType::ResolvedRefs), ("True", "ResolvedRefs".to_owned()));
    }

    #[test]
    fn caches_follow_deleted_objects() {
        let state = state(&format!("{GATEWAY}\n---\n{ROUTE}\n---\n{SERVICE}"));
        let translator = Translator::new("kubvernor", "cluster.local");
        translator.translate(&state.snapshot().unwrap()).unwrap();
        assert_eq!(translator.http_routes.len().unwrap(), 1);
        assert_eq!(translator.gateways.len().unwrap(), 1);

        state.delete::<HTTPRoute>(&route_key()).unwrap();
        state.delete::<crate::common::gateway_api::gateways::Gateway>(&ResourceKey::with_kind("gateway.networking.k8s.io", "Gateway", "ns", "g")).unwrap();
        let fragments = translator.translate(&state.snapshot().unwrap()).unwrap();
        assert_eq!(translator.http_routes.len().unwrap(), 0);
        assert_eq!(translator.gateways.len().unwrap(), 0);
        assert!(fragments.iter().all(|f| f.gateway.is_service()));
    }

    #[test]
    fn unmanaged_gateways_are_skipped_and_plugins_run() {
        let other = GATEWAY.replace("name: g\n", "name: other\n").replace("gatewayClassName: kubvernor", "gatewayClassName: someone-else");
        let state = state(&format!("{GATEWAY}\n---\n{other}"));
        let translator = Translator::new("kubvernor", "cluster.local").with_plugin(Arc::new(ListenerCountPolicy));
        let fragments = translator.translate(&state.snapshot().unwrap()).unwrap();

        assert!(fragments.iter().all(|f| f.gateway.name != "other"));
        let policies: Vec<&Resource> = fragments.iter().flat_map(ResourcesForGateway::resources).filter(|r| matches!(r, Resource::Policy(_))).collect();
        assert_eq!(policies.len(), 1);
        let policy_key = ResourceKey::with_kind("policies.example.com", "ListenerCount", "ns", "g");
        assert!(fragments.iter().any(|f| matches!(f.report().get(&policy_key), Some(ObjectStatus::Policy(_)))));
    }
}
