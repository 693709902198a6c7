//! Wiring of the controller against a live cluster

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client, Resource};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use virtualrouter_api::VirtualRouter;

use crate::config::ControllerConfig;
use crate::controller::VirtualRouterController;
use crate::events::KubeEventRecorder;
use crate::informer::{Informer, Notification};
use crate::kube_store::KubeStore;
use crate::{ControllerError, Result};

/// Watch `api`, keep `informer`'s cache current and hand every notification
/// to `handle`. Runs until the task is aborted.
async fn drive_informer<K, H, Fut>(api: Api<K>, mut informer: Informer<K>, handle: H)
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
    H: Fn(Notification<K>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut events = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                for notification in informer.apply(event) {
                    handle(notification).await;
                }
            }
            Err(e) => warn!(error = %e, "Watch stream error"),
        }
    }
}

/// Run the VirtualRouter controller against the cluster behind `client`
/// until `shutdown` resolves
pub async fn run<F>(client: Client, config: ControllerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    config.validate()?;

    let (router_informer, routers) = Informer::<VirtualRouter>::new();
    let (deployment_informer, deployments) = Informer::<Deployment>::new();

    let store = Arc::new(KubeStore::new(
        client.clone(),
        routers.clone(),
        deployments.clone(),
    ));
    let recorder = Arc::new(KubeEventRecorder::new(client.clone(), &config.reporter));
    let controller = Arc::new(VirtualRouterController::new(store, recorder, &config));

    info!("Setting up event handlers");
    let events = controller.event_router();
    let router_watch = tokio::spawn(drive_informer(
        Api::<VirtualRouter>::all(client.clone()),
        router_informer,
        move |notification| {
            let events = events.clone();
            async move { events.on_virtual_router(notification).await }
        },
    ));
    let events = controller.event_router();
    let deployment_watch = tokio::spawn(drive_informer(
        Api::<Deployment>::all(client),
        deployment_informer,
        move |notification| {
            let events = events.clone();
            async move { events.on_owned(notification).await }
        },
    ));

    let caches_synced = async move {
        routers
            .wait_until_ready()
            .await
            .map_err(|_| ControllerError::CacheSync)?;
        deployments
            .wait_until_ready()
            .await
            .map_err(|_| ControllerError::CacheSync)?;
        Ok(())
    };

    let result = controller
        .run(config.workers, caches_synced, shutdown)
        .await;

    router_watch.abort();
    deployment_watch.abort();
    result
}
