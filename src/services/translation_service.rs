use std::{collections::BTreeMap, sync::Arc};

use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use super::{aggregator::aggregate, status_syncer::StatusSyncer};
use crate::{
    backends::ConfigSink,
    common::{Resource, ResourceKey},
    controllers::Translator,
    state::{Snapshot, State},
};

/// Recomputes the configuration whenever the state moves.
///
/// Nothing is translated until every watched kind has finished its initial list. Changed bundles go to the sink,
/// bundles of vanished gateways are removed, and every report goes to the status syncer. A bundle the sink
/// rejected is retried on the next revision.
#[derive(TypedBuilder)]
pub struct TranslationService {
    state: State,
    translator: Translator,
    sink: Arc<dyn ConfigSink>,
    status_syncer: Arc<StatusSyncer>,
    #[builder(default)]
    deployed: BTreeMap<ResourceKey, Vec<Resource>>,
}

impl TranslationService {
    pub async fn start(mut self) -> crate::Result<()> {
        info!("Translation service started");
        let mut revisions = WatchStream::new(self.state.subscribe());
        while let Some(revision) = revisions.next().await {
            debug!("State moved to revision {revision}");
            self.reconcile().await?;
        }
        info!("Translation service stopped");
        Ok(())
    }

    async fn reconcile(&mut self) -> crate::Result<()> {
        let snapshot = self.state.snapshot()?;
        if !snapshot.has_synced() {
            debug!("Watchers still listing, translation deferred");
            return Ok(());
        }
        self.translate(&snapshot).await
    }

    #[instrument(level = "info", skip_all, fields(revision = snapshot.revision()))]
    async fn translate(&mut self, snapshot: &Snapshot) -> crate::Result<()> {
        let output = aggregate(self.translator.translate(snapshot)?);

        let mut current = BTreeMap::new();
        for (gateway, bundle) in output.bundles {
            let (_, resources, _) = bundle.into_parts();
            if self.deployed.get(&gateway) == Some(&resources) {
                debug!("Configuration for {gateway} unchanged");
            } else if let Err(e) = self.sink.push(&gateway, &resources).await {
                warn!("Pushing configuration for {gateway} failed {e}");
                if let Some(previous) = self.deployed.remove(&gateway) {
                    current.insert(gateway, previous);
                }
                continue;
            }
            current.insert(gateway, resources);
        }
        let vanished: Vec<ResourceKey> = self.deployed.keys().filter(|gateway| !current.contains_key(*gateway)).cloned().collect();
        for gateway in vanished {
            if let Err(e) = self.sink.remove(&gateway).await {
                warn!("Removing configuration for {gateway} failed {e}");
                if let Some(previous) = self.deployed.remove(&gateway) {
                    current.insert(gateway, previous);
                }
            }
        }
        self.deployed = current;

        self.status_syncer.submit(output.report).await;
        Ok(())
    }
}
