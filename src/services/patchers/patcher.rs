use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use kube::{
    api::{Patch, PatchParams},
    Api, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::{
    common::{ObjectStatus, ResourceKey},
    services::status_syncer::{StatusWriteError, WriteOutcome},
};

/// A kube object whose status subresource carries a report.
pub trait StatusTarget: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The object with the report folded into its live status, or `None` when nothing would change.
    fn with_status(&self, status: &ObjectStatus, controller_name: &str, now: &Time) -> Option<Self>;
}

#[async_trait]
pub trait Patcher<R>
where
    R: StatusTarget,
{
    fn api(&self, namespace: &str) -> Api<R>;

    fn controller_name(&self) -> &str;

    async fn patch(&self, key: &ResourceKey, status: &ObjectStatus) -> Result<WriteOutcome, StatusWriteError> {
        let api = self.api(&key.namespace);
        let Some(live) = api.get_opt(&key.name).await? else {
            debug!("{key} does not exist");
            return Ok(WriteOutcome::Missing);
        };
        let Some(mut resource) = live.with_status(status, self.controller_name(), &Time(Utc::now())) else {
            return Ok(WriteOutcome::Unchanged);
        };

        resource.meta_mut().managed_fields = None;
        resource.meta_mut().resource_version = Option::<String>::None;
        let patch_params = PatchParams::apply(self.controller_name()).force();
        match api.patch_status(&key.name, &patch_params, &Patch::Apply(resource)).await {
            Ok(_) => {
                info!("patch status result ok {key}");
                Ok(WriteOutcome::Patched)
            }
            Err(kube::Error::Api(response)) if response.code == 404 => Err(StatusWriteError::NotFound),
            Err(e) => {
                warn!("patch status failed {key} {e:?}");
                Err(e.into())
            }
        }
    }
}
