pub mod condition;
pub mod gateway_api;
pub mod parent;
pub mod references_resolver;
pub mod resource_key;
pub mod resources;
pub mod route;
pub mod status;

pub use condition::{Condition, ConditionSet, ConditionType, Observation};
pub use parent::{ParentError, ParentInfo, ParentKind, ParentRegistry, RouteParentReference};
pub use references_resolver::{BackendError, BackendIndex, BackendResolver, GroupKind, KubeBackendIndex, ReferenceGrantIndex, ReferenceGrants};
pub use resource_key::{ResourceKey, RouteRefKey, DEFAULT_GROUP_NAME, DEFAULT_KIND_NAME, DEFAULT_NAMESPACE_NAME, DEFAULT_ROUTE_HOSTNAME};
pub use resources::{Bind, Listener, ListenerId, ListenerTls, Policy, ProtocolType, Resource, ResourceId, ResourcesForGateway};
pub use route::{BackendPointer, PathMatch, Route, RouteBackend, RouteFilter, RouteMatch};
pub use status::{GatewayStatusReport, ListenerStatusReport, ObjectStatus, PolicyStatusReport, RouteParentStatusReport, RouteStatusReport, StatusReport};
