use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Namespace, apimachinery::pkg::apis::meta::v1::LabelSelector};
use kube::ResourceExt;
use tracing::warn;

use crate::state::Collection;

/// Whether a label set satisfies a selector. An empty selector matches everything.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .as_ref()
        .map_or(true, |match_labels| match_labels.iter().all(|(k, v)| labels.get(k) == Some(v)));

    let expressions_match = selector.match_expressions.as_ref().map_or(true, |expressions| {
        expressions.iter().all(|expression| {
            let value = labels.get(&expression.key);
            let values = expression.values.as_deref().unwrap_or_default();
            match expression.operator.as_str() {
                "In" => value.is_some_and(|v| values.contains(v)),
                "NotIn" => value.map_or(true, |v| !values.contains(v)),
                "Exists" => value.is_some(),
                "DoesNotExist" => value.is_none(),
                operator => {
                    warn!("Unknown label selector operator {operator}");
                    false
                }
            }
        })
    });

    labels_match && expressions_match
}

/// Names of the namespaces selected by `selector`.
pub fn select_namespaces(namespaces: &Collection<Namespace>, selector: &LabelSelector) -> Vec<String> {
    namespaces
        .fetch()
        .filter(|(_, namespace)| selector_matches(selector, namespace.labels()))
        .map(|(_, namespace)| namespace.name_any())
        .collect()
}

pub fn namespace_matches(namespaces: &Collection<Namespace>, selector: &LabelSelector, namespace: &str) -> bool {
    select_namespaces(namespaces, selector).iter().any(|n| n == namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_expressions() {
        let selector: LabelSelector = serde_yaml::from_str(
            r"
matchLabels:
  team: edge
matchExpressions:
- key: env
  operator: In
  values: [prod, staging]
- key: legacy
  operator: DoesNotExist
",
        )
        .unwrap();
        let labels = BTreeMap::from([("team".to_owned(), "edge".to_owned()), ("env".to_owned(), "prod".to_owned())]);
        assert!(selector_matches(&selector, &labels));

        let labels = BTreeMap::from([("team".to_owned(), "edge".to_owned()), ("env".to_owned(), "dev".to_owned())]);
        assert!(!selector_matches(&selector, &labels));

        assert!(selector_matches(&LabelSelector::default(), &BTreeMap::new()));
    }
}
