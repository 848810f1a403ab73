use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use super::patcher::StatusTarget;
use crate::common::{
    condition::conditions_equal_ignoring_time,
    gateway_api::{
        common::{RouteParentStatus, RouteStatus},
        grpcroutes::GRPCRoute,
        httproutes::HTTPRoute,
        tcproutes::TCPRoute,
        tlsroutes::TLSRoute,
    },
    ObjectStatus, RouteStatusReport,
};

/// Replaces this controller's parent entries and keeps everybody else's.
fn route_status(live: Option<&RouteStatus>, report: &RouteStatusReport, controller_name: &str, now: &Time) -> Option<RouteStatus> {
    let live_parents = live.map(|status| status.parents.as_slice()).unwrap_or_default();
    let mut parents: Vec<RouteParentStatus> = live_parents.iter().filter(|p| p.controller_name != controller_name).cloned().collect();
    for parent in &report.parents {
        let existing = live_parents
            .iter()
            .find(|p| p.controller_name == controller_name && p.parent_ref == parent.parent_ref)
            .map(|p| p.conditions.as_slice())
            .unwrap_or_default();
        parents.push(RouteParentStatus {
            parent_ref: parent.parent_ref.clone(),
            controller_name: controller_name.to_owned(),
            conditions: parent.conditions.merge_into(existing, report.generation, now),
        });
    }

    let unchanged = parents.len() == live_parents.len()
        && parents.iter().all(|desired| {
            live_parents.iter().any(|live| {
                live.controller_name == desired.controller_name
                    && live.parent_ref == desired.parent_ref
                    && conditions_equal_ignoring_time(&live.conditions, &desired.conditions)
            })
        });
    if unchanged {
        None
    } else {
        Some(RouteStatus { parents })
    }
}

macro_rules! route_status_target {
    ($($kind:ty),* $(,)?) => {
        $(
            impl StatusTarget for $kind {
                fn with_status(&self, status: &ObjectStatus, controller_name: &str, now: &Time) -> Option<Self> {
                    let ObjectStatus::Route(report) = status else {
                        return None;
                    };
                    let status = route_status(self.status.as_ref(), report, controller_name, now)?;
                    let mut route = self.clone();
                    route.status = Some(status);
                    Some(route)
                }
            }
        )*
    };
}

route_status_target!(HTTPRoute, GRPCRoute, TCPRoute, TLSRoute);

#[cfg(test)]
mod tests {
    use k8s_openapi::chrono::{TimeZone, Utc};

    use super::*;
    use crate::common::{gateway_api::common::ParentReference, ConditionSet, ConditionType, Observation, RouteParentStatusReport};

    fn time(seconds: i64) -> Time {
        Time(Utc.timestamp_opt(seconds, 0).single().unwrap())
    }

    fn report(reason: &str) -> ObjectStatus {
        ObjectStatus::Route(RouteStatusReport {
            generation: Some(1),
            parents: vec![RouteParentStatusReport {
                parent_ref: ParentReference {
                    name: "g".to_owned(),
                    ..Default::default()
                },
                conditions: ConditionSet::new().with(ConditionType::Accepted, Observation::healthy(reason, "route accepted")),
            }],
        })
    }

    fn route() -> HTTPRoute {
        serde_yaml::from_str(
            r"
metadata:
  name: r
  namespace: ns
spec:
  parentRefs:
  - name: g
  - name: elsewhere
status:
  parents:
  - parentRef:
      name: elsewhere
    controllerName: example.com/other
    conditions: []
  - parentRef:
      name: stale
    controllerName: kubvernor.com/proxy-controller
    conditions: []
",
        )
        .unwrap()
    }

    #[test]
    fn other_controllers_keep_their_entries() {
        let patched = route().with_status(&report("Accepted"), "kubvernor.com/proxy-controller", &time(10)).unwrap();
        let parents = &patched.status.as_ref().unwrap().parents;
        let names: Vec<(&str, &str)> = parents.iter().map(|p| (p.parent_ref.name.as_str(), p.controller_name.as_str())).collect();
        assert_eq!(names, vec![("elsewhere", "example.com/other"), ("g", "kubvernor.com/proxy-controller")]);

        assert!(patched.with_status(&report("Accepted"), "kubvernor.com/proxy-controller", &time(20)).is_none());
        assert!(patched.with_status(&report("DeprecatedField"), "kubvernor.com/proxy-controller", &time(20)).is_some());
    }
}
