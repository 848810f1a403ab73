use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

use super::patcher::StatusTarget;
use crate::common::{
    condition::conditions_equal_ignoring_time,
    gateway_api::{
        gateways::{Gateway, GatewayStatus, ListenerStatus},
        listenersets::{ListenerSetStatus, XListenerSet},
    },
    GatewayStatusReport, ListenerStatusReport, ObjectStatus,
};

fn listener_statuses(live: &[ListenerStatus], reports: &[ListenerStatusReport], generation: Option<i64>, now: &Time) -> Vec<ListenerStatus> {
    reports
        .iter()
        .map(|report| {
            let existing = live.iter().find(|l| l.name == report.name).map(|l| l.conditions.as_slice()).unwrap_or_default();
            ListenerStatus {
                name: report.name.clone(),
                supported_kinds: report.supported_kinds.clone(),
                attached_routes: report.attached_routes,
                conditions: report.conditions.merge_into(existing, generation, now),
            }
        })
        .collect()
}

fn listeners_equal(left: &[ListenerStatus], right: &[ListenerStatus]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(l, r)| {
            l.name == r.name && l.supported_kinds == r.supported_kinds && l.attached_routes == r.attached_routes && conditions_equal_ignoring_time(&l.conditions, &r.conditions)
        })
}

/// Conditions and listeners for a Gateway or ListenerSet, `None` when the live ones already match.
fn desired(live_conditions: &[Condition], live_listeners: &[ListenerStatus], report: &GatewayStatusReport, now: &Time) -> Option<(Vec<Condition>, Vec<ListenerStatus>)> {
    let conditions = report.conditions.merge_into(live_conditions, report.generation, now);
    let listeners = listener_statuses(live_listeners, &report.listeners, report.generation, now);
    if conditions_equal_ignoring_time(live_conditions, &conditions) && listeners_equal(live_listeners, &listeners) {
        None
    } else {
        Some((conditions, listeners))
    }
}

impl StatusTarget for Gateway {
    fn with_status(&self, status: &ObjectStatus, _controller_name: &str, now: &Time) -> Option<Self> {
        let ObjectStatus::Gateway(report) = status else {
            return None;
        };
        let live = self.status.clone().unwrap_or_default();
        let (conditions, listeners) = desired(live.conditions.as_deref().unwrap_or_default(), live.listeners.as_deref().unwrap_or_default(), report, now)?;
        let mut gateway = self.clone();
        gateway.status = Some(GatewayStatus {
            conditions: Some(conditions),
            listeners: Some(listeners),
        });
        Some(gateway)
    }
}

impl StatusTarget for XListenerSet {
    fn with_status(&self, status: &ObjectStatus, _controller_name: &str, now: &Time) -> Option<Self> {
        let ObjectStatus::ListenerSet(report) = status else {
            return None;
        };
        let live = self.status.clone().unwrap_or_default();
        let (conditions, listeners) = desired(live.conditions.as_deref().unwrap_or_default(), live.listeners.as_deref().unwrap_or_default(), report, now)?;
        let mut listener_set = self.clone();
        listener_set.status = Some(ListenerSetStatus {
            conditions: Some(conditions),
            listeners: Some(listeners),
        });
        Some(listener_set)
    }
}
