use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Statically addressed backend outside the cluster service registry.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.kubvernor.io",
    version = "v1alpha1",
    kind = "Backend",
    root = "KubeBackend",
    derive = "PartialEq",
    derive = "Default",
    namespaced
)]
pub struct BackendSpec {
    pub host: String,
    pub port: i32,
}
