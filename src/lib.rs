use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt};
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use kube::Client;
use tracing::info;

pub mod backends;
pub mod common;
pub mod configuration;
pub mod controllers;
pub mod services;
pub mod state;

pub use configuration::Configuration;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

use backends::LoggingConfigSink;
use common::gateway_api::{
    backends::KubeBackend, gateways::Gateway, grpcroutes::GRPCRoute, httproutes::HTTPRoute, inferencepools::InferencePool, listenersets::XListenerSet,
    referencegrants::ReferenceGrant, tcproutes::TCPRoute, tlsroutes::TLSRoute,
};
use controllers::Translator;
use serde::de::DeserializeOwned;
use services::{watchers::watch, KubeStatusWriter, StatusSyncer, TranslationService};
use state::{State, Stored};

/// Registers the kind with the readiness gate before its watcher runs.
fn tracked_watch<K>(client: &Client, state: &State) -> Result<BoxFuture<'static, Result<()>>>
where
    K: Stored + DeserializeOwned + std::fmt::Debug,
{
    state.track::<K>()?;
    Ok(watch::<K>(client.clone(), state.clone()).boxed())
}

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("Kubvernor translator started");
    let state = State::new();
    let client = Client::try_default().await?;

    let status_writer = KubeStatusWriter::builder().client(client.clone()).controller_name(configuration.controller_name.clone()).build();
    let status_syncer = Arc::new(StatusSyncer::new(Arc::new(status_writer), configuration.status.clone()));

    let translation_service = TranslationService::builder()
        .state(state.clone())
        .translator(Translator::new(&configuration.gateway_class_name, &configuration.domain_suffix))
        .sink(Arc::new(LoggingConfigSink))
        .status_syncer(Arc::clone(&status_syncer))
        .build();

    let services = vec![
        tracked_watch::<Gateway>(&client, &state)?,
        tracked_watch::<XListenerSet>(&client, &state)?,
        tracked_watch::<HTTPRoute>(&client, &state)?,
        tracked_watch::<GRPCRoute>(&client, &state)?,
        tracked_watch::<TCPRoute>(&client, &state)?,
        tracked_watch::<TLSRoute>(&client, &state)?,
        tracked_watch::<ReferenceGrant>(&client, &state)?,
        tracked_watch::<Service>(&client, &state)?,
        tracked_watch::<Secret>(&client, &state)?,
        tracked_watch::<Namespace>(&client, &state)?,
        tracked_watch::<InferencePool>(&client, &state)?,
        tracked_watch::<KubeBackend>(&client, &state)?,
        translation_service.start().boxed(),
        status_syncer.start().boxed(),
    ];

    futures::future::join_all(services).await;
    info!("Kubvernor translator stopped");
    Ok(())
}
