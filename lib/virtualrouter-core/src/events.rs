//! User-visible Kubernetes Events recorded against VirtualRouters
//!
//! Recording is fire-and-forget: it never blocks a sync and a failed
//! publish is only logged.

use kube::Client;
use kube::Resource;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;
use virtualrouter_api::VirtualRouter;

/// Reason of the event emitted after a successful sync
pub const SUCCESS_SYNCED: &str = "Synced";
/// Reason of the event emitted when a same-named Deployment is not ours
pub const ERR_RESOURCE_EXISTS: &str = "ErrResourceExists";

pub const MESSAGE_RESOURCE_SYNCED: &str = "VirtualRouter synced successfully";

/// Message for [`ERR_RESOURCE_EXISTS`]
pub fn message_resource_exists(name: &str) -> String {
    format!("Resource {:?} already exists and is not managed by VirtualRouter", name)
}

/// Sink for events about a VirtualRouter
pub trait EventRecorder: Send + Sync {
    fn record(&self, subject: &VirtualRouter, type_: EventType, reason: &str, note: String);
}

/// Publishes events through the Kubernetes Events API
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, subject: &VirtualRouter, type_: EventType, reason: &str, note: String) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            subject.object_ref(&()),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(event).await {
                warn!(error = %e, "Failed to publish Kubernetes event");
            }
        });
    }
}
