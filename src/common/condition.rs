use std::{collections::BTreeMap, fmt::Display};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition as KubeCondition, Time};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ConditionType {
    Accepted,
    Conflicted,
    Programmed,
    ResolvedRefs,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Accepted => "Accepted",
            ConditionType::Conflicted => "Conflicted",
            ConditionType::Programmed => "Programmed",
            ConditionType::ResolvedRefs => "ResolvedRefs",
        }
    }

    /// Status a healthy object reports for this condition.
    fn healthy_status(self) -> bool {
        !matches!(self, ConditionType::Conflicted)
    }
}

impl Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Observation {
    Healthy { reason: String, message: String },
    Error { reason: String, message: String },
}

impl Observation {
    pub fn healthy(reason: &str, message: impl Into<String>) -> Self {
        Self::Healthy {
            reason: reason.to_owned(),
            message: message.into(),
        }
    }

    pub fn error(reason: &str, message: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.to_owned(),
            message: message.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Observation::Healthy { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Observation::Healthy { reason, .. } | Observation::Error { reason, .. } => reason,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Observation::Healthy { message, .. } | Observation::Error { message, .. } => message,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Condition {
    pub observation: Observation,
    /// When the live condition already carries this reason it is left untouched.
    pub set_once: Option<String>,
}

impl Condition {
    pub fn status(&self, condition_type: ConditionType) -> &'static str {
        if self.observation.is_healthy() == condition_type.healthy_status() {
            "True"
        } else {
            "False"
        }
    }
}

impl From<Observation> for Condition {
    fn from(observation: Observation) -> Self {
        Self { observation, set_once: None }
    }
}

/// Conditions of one object keyed by type.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConditionSet(BTreeMap<ConditionType, Condition>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, condition_type: ConditionType, condition: impl Into<Condition>) -> &mut Self {
        self.0.insert(condition_type, condition.into());
        self
    }

    pub fn with(mut self, condition_type: ConditionType, condition: impl Into<Condition>) -> Self {
        self.set(condition_type, condition);
        self
    }

    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.get(&condition_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConditionType, &Condition)> {
        self.0.iter()
    }

    /// Status string this set would write for a type, if present.
    pub fn status_of(&self, condition_type: ConditionType) -> Option<&'static str> {
        self.get(condition_type).map(|c| c.status(condition_type))
    }

    pub fn reason_of(&self, condition_type: ConditionType) -> Option<&str> {
        self.get(condition_type).map(|c| c.observation.reason())
    }

    /// Folds the observed conditions into a live list.
    ///
    /// Unknown types are preserved. An entry is replaced only when status, reason, message or generation changed,
    /// and its transition time moves only when the status flips. The result is sorted by type.
    pub fn merge_into(&self, live: &[KubeCondition], generation: Option<i64>, now: &Time) -> Vec<KubeCondition> {
        let mut merged: BTreeMap<String, KubeCondition> = live.iter().map(|c| (c.type_.clone(), c.clone())).collect();

        for (condition_type, condition) in &self.0 {
            let status = condition.status(*condition_type).to_owned();
            let desired = KubeCondition {
                type_: condition_type.as_str().to_owned(),
                status,
                reason: condition.observation.reason().to_owned(),
                message: condition.observation.message().to_owned(),
                observed_generation: generation,
                last_transition_time: now.clone(),
            };

            match merged.get(condition_type.as_str()) {
                Some(existing) if condition.set_once.as_deref() == Some(existing.reason.as_str()) => {}
                Some(existing) if same_content(existing, &desired) => {}
                Some(existing) if existing.status == desired.status => {
                    let last_transition_time = existing.last_transition_time.clone();
                    merged.insert(desired.type_.clone(), KubeCondition { last_transition_time, ..desired });
                }
                _ => {
                    merged.insert(desired.type_.clone(), desired);
                }
            }
        }

        merged.into_values().collect()
    }
}

fn same_content(left: &KubeCondition, right: &KubeCondition) -> bool {
    left.type_ == right.type_
        && left.status == right.status
        && left.reason == right.reason
        && left.message == right.message
        && left.observed_generation == right.observed_generation
}

/// Compares two condition lists without looking at transition times.
pub fn conditions_equal_ignoring_time(left: &[KubeCondition], right: &[KubeCondition]) -> bool {
    left.len() == right.len() && left.iter().zip(right.iter()).all(|(l, r)| same_content(l, r))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::chrono::{TimeZone, Utc};

    use super::*;

    fn time(seconds: i64) -> Time {
        Time(Utc.timestamp_opt(seconds, 0).single().unwrap())
    }

    #[test]
    fn polarity_is_resolved_at_write_time() {
        let conditions = ConditionSet::new()
            .with(ConditionType::Accepted, Observation::healthy("Accepted", ""))
            .with(ConditionType::Conflicted, Observation::healthy("NoConflicts", ""))
            .with(ConditionType::ResolvedRefs, Observation::error("BackendNotFound", "missing"));

        assert_eq!(conditions.status_of(ConditionType::Accepted), Some("True"));
        assert_eq!(conditions.status_of(ConditionType::Conflicted), Some("False"));
        assert_eq!(conditions.status_of(ConditionType::ResolvedRefs), Some("False"));

        let conflicted = ConditionSet::new().with(ConditionType::Conflicted, Observation::error("ProtocolConflict", ""));
        assert_eq!(conflicted.status_of(ConditionType::Conflicted), Some("True"));
    }

    #[test]
    fn merge_keeps_unchanged_entries() {
        let conditions = ConditionSet::new()
            .with(ConditionType::Programmed, Observation::healthy("Programmed", ""))
            .with(ConditionType::Accepted, Observation::healthy("Accepted", ""));
        let first = conditions.merge_into(&[], Some(1), &time(10));
        assert_eq!(first.iter().map(|c| c.type_.as_str()).collect::<Vec<_>>(), vec!["Accepted", "Programmed"]);

        let second = conditions.merge_into(&first, Some(1), &time(20));
        assert_eq!(first, second);

        let third = conditions.merge_into(&first, Some(2), &time(30));
        assert_eq!(third[0].observed_generation, Some(2));
        assert_eq!(third[0].last_transition_time, time(10));
        assert!(!conditions_equal_ignoring_time(&first, &third));
    }

    #[test]
    fn merge_moves_transition_time_on_flip() {
        let healthy = ConditionSet::new().with(ConditionType::Accepted, Observation::healthy("Accepted", ""));
        let broken = ConditionSet::new().with(ConditionType::Accepted, Observation::error("NotAllowedByListeners", ""));
        let first = healthy.merge_into(&[], Some(1), &time(10));
        let second = broken.merge_into(&first, Some(1), &time(20));
        assert_eq!(second[0].status, "False");
        assert_eq!(second[0].last_transition_time, time(20));
    }

    #[test]
    fn merge_respects_set_once_and_foreign_types() {
        let mut live = ConditionSet::new()
            .with(ConditionType::Accepted, Observation::healthy("Pending", ""))
            .merge_into(&[], None, &time(1));
        live.push(KubeCondition {
            type_: "Custom".to_owned(),
            status: "True".to_owned(),
            reason: "Other".to_owned(),
            message: String::new(),
            observed_generation: None,
            last_transition_time: time(1),
        });

        let once = ConditionSet::new().with(
            ConditionType::Accepted,
            Condition {
                observation: Observation::healthy("Accepted", ""),
                set_once: Some("Pending".to_owned()),
            },
        );
        let merged = once.merge_into(&live, None, &time(2));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].reason, "Pending");
        assert_eq!(merged[1].type_, "Custom");
    }
}
