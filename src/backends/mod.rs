use async_trait::async_trait;
use tracing::info;

use crate::common::{Resource, ResourceKey};

/// Receives the configuration of each gateway once it changes.
#[async_trait]
pub trait ConfigSink: Send + Sync {
    async fn push(&self, gateway: &ResourceKey, resources: &[Resource]) -> crate::Result<()>;

    async fn remove(&self, gateway: &ResourceKey) -> crate::Result<()>;
}

/// Dumps bundles as JSON into the log, used when no data plane is attached.
#[derive(Clone, Debug, Default)]
pub struct LoggingConfigSink;

#[async_trait]
impl ConfigSink for LoggingConfigSink {
    async fn push(&self, gateway: &ResourceKey, resources: &[Resource]) -> crate::Result<()> {
        let json = serde_json::to_string(resources)?;
        info!("Configuration for {gateway} {json}");
        Ok(())
    }

    async fn remove(&self, gateway: &ResourceKey) -> crate::Result<()> {
        info!("Configuration for {gateway} removed");
        Ok(())
    }
}
