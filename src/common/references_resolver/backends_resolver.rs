use k8s_openapi::api::core::v1::Service;
use thiserror::Error;
use tracing::debug;

use super::{GroupKind, ReferenceGrantIndex};
use crate::{
    common::{
        gateway_api::{backends::KubeBackend, common::BackendObjectReference, inferencepools::InferencePool},
        resource_key::{BACKEND_GROUP_NAME, BACKEND_KIND_NAME, CORE_GROUP_NAME, INFERENCE_POOL_GROUP_NAME, INFERENCE_POOL_KIND_NAME, SERVICE_KIND_NAME},
        route::{BackendPointer, RouteBackend},
        ResourceKey,
    },
    state::Collection,
};

#[derive(Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendError {
    #[error("backendRef {0} not accessible to a {1} in namespace {2:?} (missing a ReferenceGrant?)")]
    RefNotPermitted(String, String, String),
    #[error("backend {0} not found")]
    BackendNotFound(String),
    #[error("referencing unsupported backendRef: group {0:?} kind {1:?}")]
    InvalidKind(String, String),
    #[error("{0}")]
    UnsupportedValue(String),
}

impl BackendError {
    pub fn reason(&self) -> &'static str {
        match self {
            BackendError::RefNotPermitted(..) => "RefNotPermitted",
            BackendError::BackendNotFound(_) => "BackendNotFound",
            BackendError::InvalidKind(..) => "InvalidKind",
            BackendError::UnsupportedValue(_) => "UnsupportedValue",
        }
    }

    /// Fatal errors drop the whole rule, the others only the backend.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::UnsupportedValue(_))
    }
}

/// Lookup of generic `Backend` objects.
pub trait BackendIndex {
    fn get_backend_from_ref(&self, route: &ResourceKey, backend: &ResourceKey, port: Option<i32>) -> Option<BackendPointer>;
}

pub struct KubeBackendIndex<'a> {
    backends: &'a Collection<KubeBackend>,
}

impl<'a> KubeBackendIndex<'a> {
    pub fn new(backends: &'a Collection<KubeBackend>) -> Self {
        Self { backends }
    }
}

impl BackendIndex for KubeBackendIndex<'_> {
    fn get_backend_from_ref(&self, route: &ResourceKey, backend: &ResourceKey, port: Option<i32>) -> Option<BackendPointer> {
        let stored = self.backends.get(backend);
        debug!("Route {route} backend {backend} found {}", stored.is_some());
        stored.map(|b| BackendPointer::Backend {
            key: backend.clone(),
            hostname: b.spec.host.clone(),
            port: port.unwrap_or(b.spec.port),
        })
    }
}

pub type Resolution = (Option<RouteBackend>, Option<BackendError>);

/// Resolves one backend reference of a route into a concrete destination.
pub struct BackendResolver<'a> {
    reference_grants: &'a dyn ReferenceGrantIndex,
    services: &'a Collection<Service>,
    inference_pools: &'a Collection<InferencePool>,
    backends: &'a dyn BackendIndex,
    domain_suffix: &'a str,
}

impl<'a> BackendResolver<'a> {
    pub fn new(
        reference_grants: &'a dyn ReferenceGrantIndex,
        services: &'a Collection<Service>,
        inference_pools: &'a Collection<InferencePool>,
        backends: &'a dyn BackendIndex,
        domain_suffix: &'a str,
    ) -> Self {
        Self {
            reference_grants,
            services,
            inference_pools,
            backends,
            domain_suffix,
        }
    }

    pub fn resolve(&self, route: &ResourceKey, backend_ref: &BackendObjectReference, weight: Option<i32>) -> Resolution {
        let weight = weight.unwrap_or(1);
        if weight == 0 {
            debug!("Route {route} backend {} has weight 0, skipping", backend_ref.name);
            return (None, None);
        }
        if weight < 0 {
            return (None, Some(BackendError::UnsupportedValue(format!("weight {weight} of backend {} is negative", backend_ref.name))));
        }

        let key = ResourceKey::from((backend_ref, route.namespace.clone()));
        let to = GroupKind::new(&key.group, &key.kind);
        let from = GroupKind::new(&route.group, &route.kind);
        if !self.reference_grants.allowed(&from, &route.namespace, &to, &key.namespace, &key.name) {
            return (None, Some(BackendError::RefNotPermitted(format!("{}/{}", key.namespace, key.name), route.kind.clone(), route.namespace.clone())));
        }

        let pointer = match (key.group.as_str(), key.kind.as_str()) {
            (CORE_GROUP_NAME, SERVICE_KIND_NAME) => self.resolve_service(&key, backend_ref.port),
            (INFERENCE_POOL_GROUP_NAME, INFERENCE_POOL_KIND_NAME) => self.resolve_inference_pool(&key),
            (BACKEND_GROUP_NAME, BACKEND_KIND_NAME) => self
                .backends
                .get_backend_from_ref(route, &key, backend_ref.port)
                .ok_or_else(|| BackendError::BackendNotFound(format!("{}/{}", key.namespace, key.name))),
            (group, kind) => Err(BackendError::InvalidKind(group.to_owned(), kind.to_owned())),
        };

        match pointer {
            Ok(backend) => (
                Some(RouteBackend {
                    weight,
                    backend,
                    filters: vec![],
                }),
                None,
            ),
            Err(e) => {
                debug!("Route {route} backend {key} not resolved {e}");
                (None, Some(e))
            }
        }
    }

    fn resolve_service(&self, key: &ResourceKey, port: Option<i32>) -> Result<BackendPointer, BackendError> {
        if key.name.contains('.') {
            return Err(BackendError::UnsupportedValue(format!("service name {} must not contain '.'", key.name)));
        }
        let Some(port) = port else {
            return Err(BackendError::UnsupportedValue(format!("port is required for service backend {}", key.name)));
        };
        if self.services.get(key).is_none() {
            return Err(BackendError::BackendNotFound(format!("{}/{}", key.namespace, key.name)));
        }
        Ok(BackendPointer::Service {
            hostname: format!("{}.{}.svc.{}", key.name, key.namespace, self.domain_suffix),
            port,
        })
    }

    fn resolve_inference_pool(&self, key: &ResourceKey) -> Result<BackendPointer, BackendError> {
        if key.name.contains('.') {
            return Err(BackendError::UnsupportedValue(format!("inference pool name {} must not contain '.'", key.name)));
        }
        let pool = self.inference_pools.get(key).ok_or_else(|| BackendError::BackendNotFound(format!("{}/{}", key.namespace, key.name)))?;
        Ok(BackendPointer::InferencePool {
            hostname: format!("{}.{}.inference.{}", key.name, key.namespace, self.domain_suffix),
            port: pool.spec.target_port_number,
        })
    }
}
