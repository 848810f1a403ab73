use crate::{
    common::{ParentRegistry, ResourcesForGateway},
    state::Snapshot,
};

/// Contract for policy extensions.
///
/// A plugin reads the snapshot and the parents registered for this pass and returns fragments carrying
/// `Policy` resources for the gateways it targets, plus policy ancestor status in the fragment report.
pub trait PolicyPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn translate(&self, snapshot: &Snapshot, registry: &ParentRegistry) -> Vec<ResourcesForGateway>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::common::{
        ConditionSet, ConditionType, ObjectStatus, Observation, ParentKind, Policy, PolicyStatusReport, Resource, ResourceKey, RouteParentStatusReport,
        StatusReport,
    };

    /// Attaches one policy to every gateway that has at least one listener registered.
    pub(crate) struct ListenerCountPolicy;

    impl PolicyPlugin for ListenerCountPolicy {
        fn name(&self) -> &str {
            "listener-count"
        }

        fn translate(&self, _snapshot: &Snapshot, registry: &ParentRegistry) -> Vec<ResourcesForGateway> {
            let mut counts: BTreeMap<ResourceKey, usize> = BTreeMap::new();
            for (_, parent) in registry.iter().filter(|(_, p)| p.internal_kind == ParentKind::Listener) {
                *counts.entry(parent.parent_gateway.clone()).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(gateway, count)| {
                    let policy_key = ResourceKey::with_kind("policies.example.com", "ListenerCount", &gateway.namespace, &gateway.name);
                    let mut report = StatusReport::new();
                    report.insert(
                        policy_key,
                        ObjectStatus::Policy(PolicyStatusReport {
                            generation: None,
                            ancestors: vec![RouteParentStatusReport {
                                parent_ref: crate::common::gateway_api::common::ParentReference {
                                    name: gateway.name.clone(),
                                    namespace: Some(gateway.namespace.clone()),
                                    ..Default::default()
                                },
                                conditions: ConditionSet::new().with(ConditionType::Accepted, Observation::healthy("Accepted", "policy attached")),
                            }],
                        }),
                    );
                    ResourcesForGateway::new(gateway.clone())
                        .with_resource(Resource::Policy(Policy {
                            key: format!("{}/{}.listener-count", gateway.namespace, gateway.name),
                            target: gateway,
                            config: BTreeMap::from([("listeners".to_owned(), count.to_string())]),
                        }))
                        .with_report(report)
                })
                .collect()
        }
    }
}
