use std::collections::BTreeMap;

use super::{
    condition::ConditionSet,
    gateway_api::{common::ParentReference, gateways::RouteGroupKind},
    ResourceKey,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerStatusReport {
    pub name: String,
    pub supported_kinds: Vec<RouteGroupKind>,
    pub attached_routes: i32,
    pub conditions: ConditionSet,
}

/// Status of a Gateway or ListenerSet.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GatewayStatusReport {
    pub generation: Option<i64>,
    pub conditions: ConditionSet,
    pub listeners: Vec<ListenerStatusReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteParentStatusReport {
    pub parent_ref: ParentReference,
    pub conditions: ConditionSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteStatusReport {
    pub generation: Option<i64>,
    pub parents: Vec<RouteParentStatusReport>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyStatusReport {
    pub generation: Option<i64>,
    pub ancestors: Vec<RouteParentStatusReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectStatus {
    Gateway(GatewayStatusReport),
    ListenerSet(GatewayStatusReport),
    Route(RouteStatusReport),
    Policy(PolicyStatusReport),
}

/// Observed status for every object touched by a translation pass, keyed by object identity.
///
/// Merging is a union; two reports for the same object resolve to the greater one so the
/// result does not depend on merge order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    entries: BTreeMap<ResourceKey, ObjectStatus>,
}

impl StatusReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ResourceKey, status: ObjectStatus) {
        match self.entries.get(&key) {
            Some(existing) if *existing >= status => {}
            _ => {
                self.entries.insert(key, status);
            }
        }
    }

    pub fn merge(mut self, other: StatusReport) -> StatusReport {
        for (key, status) in other.entries {
            self.insert(key, status);
        }
        self
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ObjectStatus> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ResourceKey) -> Option<&mut ObjectStatus> {
        self.entries.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ObjectStatus)> {
        self.entries.iter()
    }

    /// Entries for one object kind, e.g. `HTTPRoute`.
    pub fn for_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = (&'a ResourceKey, &'a ObjectStatus)> + 'a {
        self.entries.iter().filter(move |(key, _)| key.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl IntoIterator for StatusReport {
    type Item = (ResourceKey, ObjectStatus);
    type IntoIter = std::collections::btree_map::IntoIter<ResourceKey, ObjectStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::condition::{ConditionType, Observation};

    fn route_status(reason: &str) -> ObjectStatus {
        ObjectStatus::Route(RouteStatusReport {
            generation: Some(1),
            parents: vec![RouteParentStatusReport {
                parent_ref: ParentReference {
                    name: "gateway".to_owned(),
                    ..Default::default()
                },
                conditions: ConditionSet::new().with(ConditionType::Accepted, Observation::healthy(reason, "")),
            }],
        })
    }

    #[test]
    fn merge_is_order_independent() {
        let key = ResourceKey::with_kind("gateway.networking.k8s.io", "HTTPRoute", "ns", "r");
        let mut left = StatusReport::new();
        left.insert(key.clone(), route_status("Accepted"));
        let mut right = StatusReport::new();
        right.insert(key.clone(), route_status("Other"));

        assert_eq!(left.clone().merge(right.clone()), right.clone().merge(left.clone()));
        assert_eq!(left.clone().merge(left.clone()), left);
        assert_eq!(left.merge(StatusReport::new()).for_kind("HTTPRoute").count(), 1);
    }
}
