mod gateway_patcher;
mod patcher;
mod route_patcher;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use tracing::debug;
use typed_builder::TypedBuilder;

pub use patcher::{Patcher, StatusTarget};

use super::status_syncer::{StatusWriteError, StatusWriter, WriteOutcome};
use crate::common::{
    gateway_api::{gateways::Gateway, grpcroutes::GRPCRoute, httproutes::HTTPRoute, listenersets::XListenerSet, tcproutes::TCPRoute, tlsroutes::TLSRoute},
    ObjectStatus, ResourceKey,
};

/// Writes reports to the status subresource of the live objects with server side apply.
#[derive(Clone, TypedBuilder)]
pub struct KubeStatusWriter {
    client: Client,
    controller_name: String,
}

impl<R> Patcher<R> for KubeStatusWriter
where
    R: StatusTarget + Resource<Scope = NamespaceResourceScope>,
{
    fn api(&self, namespace: &str) -> Api<R> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn controller_name(&self) -> &str {
        &self.controller_name
    }
}

fn is<R: Resource<DynamicType = ()>>(key: &ResourceKey) -> bool {
    key.group == R::group(&()) && key.kind == R::kind(&())
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn write(&self, key: &ResourceKey, status: &ObjectStatus) -> Result<WriteOutcome, StatusWriteError> {
        match status {
            ObjectStatus::Gateway(_) if is::<Gateway>(key) => <Self as Patcher<Gateway>>::patch(self, key, status).await,
            ObjectStatus::ListenerSet(_) if is::<XListenerSet>(key) => <Self as Patcher<XListenerSet>>::patch(self, key, status).await,
            ObjectStatus::Route(_) if is::<HTTPRoute>(key) => <Self as Patcher<HTTPRoute>>::patch(self, key, status).await,
            ObjectStatus::Route(_) if is::<GRPCRoute>(key) => <Self as Patcher<GRPCRoute>>::patch(self, key, status).await,
            ObjectStatus::Route(_) if is::<TCPRoute>(key) => <Self as Patcher<TCPRoute>>::patch(self, key, status).await,
            ObjectStatus::Route(_) if is::<TLSRoute>(key) => <Self as Patcher<TLSRoute>>::patch(self, key, status).await,
            _ => {
                debug!("No status writer for {key}");
                Ok(WriteOutcome::Missing)
            }
        }
    }
}
