//! Level-triggered sync of one VirtualRouter
//!
//! Each sync reads the current intent and cluster state, converges the
//! managed objects and writes back status. Callers guarantee a key is never
//! synced concurrently, which makes the read-then-write steps safe.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube_runtime::events::EventType;
use tracing::{debug, info, warn};
use virtualrouter_api::VirtualRouter;

use crate::ensure::ensure_all;
use crate::events::{
    message_resource_exists, EventRecorder, ERR_RESOURCE_EXISTS, MESSAGE_RESOURCE_SYNCED,
    SUCCESS_SYNCED,
};
use crate::key::split_meta_namespace_key;
use crate::owner::{is_controlled_by, owner_reference};
use crate::projection::{observed_replicas, project_deployment, project_status};
use crate::store::ResourceStore;
use crate::{ControllerError, Result};

/// Why a key was dropped without touching the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InvalidKey,
    NotFound,
    MissingDeploymentName,
}

/// Result of a successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { available_replicas: i32 },
    /// Nothing can be done for the current revision; a later watch event
    /// brings the key back
    Dropped(DropReason),
}

pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    recorder: Arc<dyn EventRecorder>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ResourceStore>, recorder: Arc<dyn EventRecorder>) -> Self {
        Self { store, recorder }
    }

    /// Converge the VirtualRouter named by `key` (`namespace/name`)
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome> {
        let (namespace, name) = match split_meta_namespace_key(key) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(key, error = %e, "Dropping malformed key");
                return Ok(SyncOutcome::Dropped(DropReason::InvalidKey));
            }
        };

        let Some(router) = self.store.get_virtual_router(namespace, name).await? else {
            warn!(key, "VirtualRouter in work queue no longer exists");
            return Ok(SyncOutcome::Dropped(DropReason::NotFound));
        };

        if router.spec.deployment_name.is_empty() {
            warn!(
                error = %ControllerError::MissingDeploymentName(key.to_string()),
                "Dropping VirtualRouter until its spec changes"
            );
            return Ok(SyncOutcome::Dropped(DropReason::MissingDeploymentName));
        }

        let private_namespace = router.private_namespace();
        let owner = owner_reference(&router)?;
        ensure_all(self.store.as_ref(), &private_namespace, &owner).await?;

        let deployment = self
            .converge_deployment(&router, &private_namespace, owner)
            .await?;

        let available_replicas = self.update_status(&router, &deployment).await?;

        self.recorder.record(
            &router,
            EventType::Normal,
            SUCCESS_SYNCED,
            MESSAGE_RESOURCE_SYNCED.to_string(),
        );
        Ok(SyncOutcome::Synced { available_replicas })
    }

    async fn converge_deployment(
        &self,
        router: &VirtualRouter,
        namespace: &str,
        owner: OwnerReference,
    ) -> Result<Arc<Deployment>> {
        let deployment_name = &router.spec.deployment_name;
        let Some(deployment) = self.store.get_deployment(namespace, deployment_name).await? else {
            info!(namespace, deployment = %deployment_name, "Creating Deployment");
            let desired = project_deployment(namespace, router, owner);
            return Ok(Arc::new(self.store.create_deployment(&desired).await?));
        };

        if !is_controlled_by(&deployment.metadata, router) {
            self.recorder.record(
                router,
                EventType::Warning,
                ERR_RESOURCE_EXISTS,
                message_resource_exists(deployment_name),
            );
            return Err(ControllerError::ResourceExists(deployment_name.clone()));
        }

        match router.spec.replicas {
            Some(desired) if Some(desired) != observed_replicas(&deployment) => {
                debug!(
                    namespace,
                    deployment = %deployment_name,
                    desired,
                    observed = ?observed_replicas(&deployment),
                    "Replica count drifted, updating Deployment"
                );
                let mut updated = project_deployment(namespace, router, owner);
                updated.metadata.resource_version = deployment.metadata.resource_version.clone();
                Ok(Arc::new(self.store.update_deployment(&updated).await?))
            }
            _ => Ok(deployment),
        }
    }

    /// Write the observed availability into the router's status. Skipped
    /// when nothing changed.
    async fn update_status(&self, router: &VirtualRouter, deployment: &Deployment) -> Result<i32> {
        let status = project_status(deployment);
        let available_replicas = status.available_replicas;
        if router.status.as_ref() == Some(&status) {
            return Ok(available_replicas);
        }

        // never modify the cached object
        let mut copy = router.clone();
        copy.status = Some(status);
        self.store.update_virtual_router_status(&copy).await?;
        Ok(available_replicas)
    }
}
