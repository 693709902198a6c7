//! Reconciliation engine of the VirtualRouter controller
//!
//! This library provides:
//! - A deduplicating, rate-limited work queue with single-flight processing
//! - Routing of VirtualRouter and owned-object notifications to queue keys
//! - The sync loop converging managed objects towards each VirtualRouter
//! - Create-once handling of the supporting namespace and RBAC objects

pub mod config;
pub mod controller;
pub mod ensure;
pub mod error;
pub mod event_router;
pub mod events;
pub mod informer;
pub mod key;
pub mod kube_store;
pub mod owner;
pub mod projection;
pub mod reconciler;
pub mod runtime;
pub mod store;
pub mod workqueue;

#[cfg(test)]
mod fake;

pub use config::ControllerConfig;
pub use controller::VirtualRouterController;
pub use error::{ControllerError, Result};
pub use reconciler::{DropReason, Reconciler, SyncOutcome};
pub use store::ResourceStore;
pub use workqueue::WorkQueue;
