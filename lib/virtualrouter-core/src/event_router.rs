//! Routes change notifications to work queue keys
//!
//! VirtualRouter notifications enqueue the router itself. Notifications for
//! owned objects enqueue the VirtualRouter named by their controller owner
//! reference, provided it still exists.

use std::sync::Arc;

use kube::{Resource, ResourceExt};
use tracing::{debug, error, trace, warn};
use virtualrouter_api::VirtualRouter;

use crate::informer::{DeletedObject, Notification};
use crate::key::meta_namespace_key;
use crate::owner::owning_router;
use crate::store::ResourceStore;
use crate::workqueue::WorkQueue;

#[derive(Clone)]
pub struct EventRouter {
    queue: WorkQueue<String>,
    store: Arc<dyn ResourceStore>,
}

/// Resync replays objects unchanged; two versions of the same object always
/// differ in resourceVersion.
fn same_revision<K: Resource>(old: &K, new: &K) -> bool {
    old.meta().resource_version.is_some()
        && old.meta().resource_version == new.meta().resource_version
}

impl EventRouter {
    pub fn new(queue: WorkQueue<String>, store: Arc<dyn ResourceStore>) -> Self {
        Self { queue, store }
    }

    /// Handle a notification about a VirtualRouter
    pub async fn on_virtual_router(&self, notification: Notification<VirtualRouter>) {
        match notification {
            Notification::Added(router) => self.enqueue(&router).await,
            Notification::Updated { old, new } => {
                if same_revision(old.as_ref(), new.as_ref()) {
                    trace!(name = %new.name_any(), "Skipping resync of unchanged VirtualRouter");
                    return;
                }
                self.enqueue(&new).await;
            }
            Notification::Deleted(deleted) => self.enqueue(deleted.object()).await,
        }
    }

    /// Handle a notification about an object a VirtualRouter may own
    pub async fn on_owned<K: Resource>(&self, notification: Notification<K>) {
        match notification {
            Notification::Added(obj) => self.handle_object(obj.as_ref()).await,
            Notification::Updated { old, new } => {
                if same_revision(old.as_ref(), new.as_ref()) {
                    return;
                }
                self.handle_object(new.as_ref()).await;
            }
            Notification::Deleted(DeletedObject::Known(obj)) => {
                self.handle_object(obj.as_ref()).await
            }
            Notification::Deleted(DeletedObject::FinalStateUnknown { key, obj }) => {
                debug!(%key, "Recovered deleted object from tombstone");
                self.handle_object(obj.as_ref()).await;
            }
        }
    }

    async fn handle_object<K: Resource>(&self, obj: &K) {
        trace!(name = %obj.name_any(), "Processing object");
        let Some((namespace, name)) = owning_router(obj) else {
            return;
        };

        match self.store.get_virtual_router(&namespace, &name).await {
            Ok(Some(router)) => self.enqueue(&router).await,
            Ok(None) => {
                debug!(
                    object = %obj.name_any(),
                    owner = %format!("{}/{}", namespace, name),
                    "Ignoring orphaned object"
                );
            }
            Err(e) => {
                warn!(
                    object = %obj.name_any(),
                    owner = %format!("{}/{}", namespace, name),
                    error = %e,
                    "Failed to resolve owner, dropping event"
                );
            }
        }
    }

    async fn enqueue(&self, router: &VirtualRouter) {
        match meta_namespace_key(router) {
            Ok(key) => self.queue.add(key).await,
            Err(e) => error!(error = %e, "Failed to build key for VirtualRouter"),
        }
    }
}
