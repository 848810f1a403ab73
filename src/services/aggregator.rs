use std::collections::BTreeMap;

use tracing::debug;

use crate::common::{ListenerId, ObjectStatus, ResourceKey, ResourcesForGateway, StatusReport};

/// Per gateway bundles plus the merged status of every object touched by the pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedOutput {
    pub bundles: BTreeMap<ResourceKey, ResourcesForGateway>,
    pub report: StatusReport,
}

/// Groups fragments by gateway and folds attached route counts into listener statuses.
///
/// Bundles survive only for gateways that reported their own status in this pass, or for Service parents.
pub fn aggregate(fragments: impl IntoIterator<Item = ResourcesForGateway>) -> AggregatedOutput {
    let mut grouped: BTreeMap<ResourceKey, ResourcesForGateway> = BTreeMap::new();
    for fragment in fragments {
        let merged = match grouped.remove(&fragment.gateway) {
            Some(existing) => existing.merge(fragment),
            None => fragment,
        };
        grouped.insert(merged.gateway.clone(), merged);
    }

    let mut output = AggregatedOutput::default();
    for (key, mut bundle) in grouped {
        count_attached_routes(&mut bundle);
        output.report = output.report.merge(bundle.report().clone());
        let has_gateway = matches!(bundle.report().get(&key), Some(ObjectStatus::Gateway(_)));
        if has_gateway || key.is_service() {
            output.bundles.insert(key, bundle);
        } else {
            debug!("Dropping bundle for unknown gateway {key}");
        }
    }
    output
}

fn count_attached_routes(bundle: &mut ResourcesForGateway) {
    let owners: Vec<ResourceKey> = bundle
        .report()
        .iter()
        .filter(|(_, status)| matches!(status, ObjectStatus::Gateway(_) | ObjectStatus::ListenerSet(_)))
        .map(|(key, _)| key.clone())
        .collect();

    for owner in owners {
        let counts: Vec<i32> = match bundle.report().get(&owner) {
            Some(ObjectStatus::Gateway(status) | ObjectStatus::ListenerSet(status)) => status
                .listeners
                .iter()
                .map(|listener| {
                    bundle.attached_route_count(&ListenerId {
                        parent: owner.clone(),
                        section_name: listener.name.clone(),
                    })
                })
                .collect(),
            _ => continue,
        };
        if let Some(ObjectStatus::Gateway(status) | ObjectStatus::ListenerSet(status)) = bundle.report_mut().get_mut(&owner) {
            for (listener, count) in status.listeners.iter_mut().zip(counts) {
                listener.attached_routes = count;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::{
        common::{gateway_api::httproutes::HTTPRoute, Resource},
        controllers::{route::test_support::state, Translator},
    };

    const OBJECTS: &str = r#"
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
  - name: other
    port: 8080
    protocol: HTTP
---
apiVersion: v1
kind: Service
metadata:
  name: svc
  namespace: ns
"#;

    fn route(name: &str, section: &str) -> HTTPRoute {
        serde_yaml::from_str(&format!(
            r#"
metadata:
  name: {name}
  namespace: ns
spec:
  parentRefs:
  - name: g
    sectionName: {section}
  rules:
  - backendRefs:
    - name: svc
      port: 80
"#
        ))
        .unwrap()
    }

    fn listener_counts(output: &AggregatedOutput) -> Vec<(String, i32)> {
        let key = ResourceKey::with_kind("gateway.networking.k8s.io", "Gateway", "ns", "g");
        match output.report.get(&key) {
            Some(ObjectStatus::Gateway(status)) => status.listeners.iter().map(|l| (l.name.clone(), l.attached_routes)).collect(),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn merge_order_does_not_matter() {
        let state = state(OBJECTS);
        state.apply(route("a", "http")).unwrap();
        state.apply(route("b", "http")).unwrap();
        state.apply(route("c", "other")).unwrap();
        let fragments = Translator::new("kubvernor", "cluster.local").translate(&state.snapshot().unwrap()).unwrap();
        assert!(fragments.len() > 1);

        let expected = aggregate(fragments.clone());
        for permutation in fragments.iter().cloned().permutations(fragments.len()) {
            assert_eq!(aggregate(permutation), expected);
        }
        assert_eq!(listener_counts(&expected), vec![("http".to_owned(), 2), ("other".to_owned(), 1)]);

        let bundle = &expected.bundles[&ResourceKey::with_kind("gateway.networking.k8s.io", "Gateway", "ns", "g")];
        assert_eq!(bundle.resources().filter(|r| matches!(r, Resource::Route(_))).count(), 3);
    }

    #[test]
    fn bundles_without_a_gateway_status_are_dropped() {
        let orphan = ResourceKey::with_kind("gateway.networking.k8s.io", "Gateway", "ns", "gone");
        let output = aggregate([ResourcesForGateway::new(orphan.clone())]);
        assert!(output.bundles.is_empty());
        assert!(output.report.is_empty());
    }
}
