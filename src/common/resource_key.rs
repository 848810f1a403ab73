use std::fmt::Display;

use kube::{Resource, ResourceExt};

use super::gateway_api::common::{BackendObjectReference, ParentReference};

pub const DEFAULT_GROUP_NAME: &str = "gateway.networking.k8s.io";
pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const DEFAULT_KIND_NAME: &str = "Gateway";
pub const DEFAULT_ROUTE_HOSTNAME: &str = "*";
pub const CORE_GROUP_NAME: &str = "";
pub const SERVICE_KIND_NAME: &str = "Service";
pub const SECRET_KIND_NAME: &str = "Secret";
pub const LISTENER_SET_GROUP_NAME: &str = "gateway.networking.x-k8s.io";
pub const LISTENER_SET_KIND_NAME: &str = "XListenerSet";
pub const INFERENCE_POOL_GROUP_NAME: &str = "inference.networking.x-k8s.io";
pub const INFERENCE_POOL_KIND_NAME: &str = "InferencePool";
pub const BACKEND_GROUP_NAME: &str = "gateway.kubvernor.io";
pub const BACKEND_KIND_NAME: &str = "Backend";

pub const HTTP_ROUTE_KIND_NAME: &str = "HTTPRoute";
pub const GRPC_ROUTE_KIND_NAME: &str = "GRPCRoute";
pub const TCP_ROUTE_KIND_NAME: &str = "TCPRoute";
pub const TLS_ROUTE_KIND_NAME: &str = "TLSRoute";

/// Identity of any object the translator deals with.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize)]
pub struct ResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_kind(group: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            group: group.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: kind.to_owned(),
        }
    }

    /// Key of a live kube object, group and kind taken from its type.
    pub fn from_resource<R>(resource: &R) -> Self
    where
        R: Resource<DynamicType = ()>,
    {
        Self {
            group: R::group(&()).into_owned(),
            namespace: resource.namespace().unwrap_or_else(|| DEFAULT_NAMESPACE_NAME.to_owned()),
            name: resource.name_any(),
            kind: R::kind(&()).into_owned(),
        }
    }

    pub fn is_service(&self) -> bool {
        self.group == CORE_GROUP_NAME && self.kind == SERVICE_KIND_NAME
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            name: String::default(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A parent reference with group, kind and namespace defaults applied.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct RouteRefKey {
    pub resource_key: ResourceKey,
    pub section_name: Option<String>,
    pub port: Option<i32>,
}

impl RouteRefKey {
    pub fn new(name: &str) -> Self {
        Self {
            resource_key: ResourceKey::new(name),
            ..Default::default()
        }
    }

    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self {
            resource_key: ResourceKey::namespaced(name, namespace),
            ..Default::default()
        }
    }

    /// True when the reference does not pin a listener by name or port.
    pub fn is_unscoped(&self) -> bool {
        self.section_name.is_none() && self.port.unwrap_or_default() == 0
    }
}

impl AsRef<ResourceKey> for RouteRefKey {
    fn as_ref(&self) -> &ResourceKey {
        &self.resource_key
    }
}

impl From<(&ParentReference, String)> for RouteRefKey {
    fn from((route_parent, route_namespace): (&ParentReference, String)) -> Self {
        Self {
            resource_key: ResourceKey {
                group: route_parent.group.clone().unwrap_or(DEFAULT_GROUP_NAME.to_owned()),
                namespace: route_parent.namespace.clone().unwrap_or(route_namespace),
                name: route_parent.name.clone(),
                kind: route_parent.kind.clone().unwrap_or(DEFAULT_KIND_NAME.to_owned()),
            },
            section_name: route_parent.section_name.clone().filter(|s| !s.is_empty()),
            port: route_parent.port,
        }
    }
}

/// Backend references default to the core group and `Service` kind.
impl From<(&BackendObjectReference, String)> for ResourceKey {
    fn from((value, route_namespace): (&BackendObjectReference, String)) -> Self {
        Self {
            group: value.group.clone().unwrap_or(CORE_GROUP_NAME.to_owned()),
            namespace: value.namespace.clone().unwrap_or(route_namespace),
            name: value.name.clone(),
            kind: value.kind.clone().filter(|k| !k.is_empty()).unwrap_or(SERVICE_KIND_NAME.to_owned()),
        }
    }
}

/// Canonical string form of a parent reference, used for stable ordering.
pub fn parent_reference_string(parent: &ParentReference) -> String {
    format!(
        "{}/{}/{}/{}/{}.{}",
        parent.group.as_deref().unwrap_or(DEFAULT_GROUP_NAME),
        parent.kind.as_deref().unwrap_or(DEFAULT_KIND_NAME),
        parent.name,
        parent.section_name.as_deref().unwrap_or_default(),
        parent.port.unwrap_or_default(),
        parent.namespace.as_deref().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;

    use super::*;

    #[test]
    fn parent_reference_defaults() {
        let parent: ParentReference = serde_yaml::from_str("name: gateway").unwrap();
        let key = RouteRefKey::from((&parent, "routes".to_owned()));
        assert_eq!(key.resource_key.group, DEFAULT_GROUP_NAME);
        assert_eq!(key.resource_key.kind, DEFAULT_KIND_NAME);
        assert_eq!(key.resource_key.namespace, "routes");
        assert!(key.is_unscoped());

        let parent: ParentReference = serde_yaml::from_str(
            r#"
group: ""
kind: Service
name: echo
port: 8080
"#,
        )
        .unwrap();
        let key = RouteRefKey::from((&parent, "routes".to_owned()));
        assert!(key.resource_key.is_service());
        assert!(!key.is_unscoped());
    }

    #[test]
    fn key_from_service() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("echo".to_owned()),
                namespace: Some("apps".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };
        let key = ResourceKey::from_resource(&service);
        assert!(key.is_service());
        assert_eq!(key.to_string(), "Service/apps/echo");
    }
}
