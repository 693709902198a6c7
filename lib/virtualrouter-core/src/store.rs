//! Access to cluster state used by the reconciler
//!
//! Reads of VirtualRouters and Deployments come from the local cache and
//! hand out shared, immutable snapshots. Callers copy before changing
//! anything and write through the API.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use virtualrouter_api::VirtualRouter;

use crate::Result;

/// Kinds of supporting object created once per VirtualRouter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportingKind {
    Namespace,
    ServiceAccount,
    Role,
    RoleBinding,
}

impl SupportingKind {
    /// Creation order; later objects reference earlier ones
    pub const ORDERED: [SupportingKind; 4] = [
        SupportingKind::Namespace,
        SupportingKind::ServiceAccount,
        SupportingKind::Role,
        SupportingKind::RoleBinding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportingKind::Namespace => "Namespace",
            SupportingKind::ServiceAccount => "ServiceAccount",
            SupportingKind::Role => "Role",
            SupportingKind::RoleBinding => "RoleBinding",
        }
    }
}

impl fmt::Display for SupportingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built supporting object ready to be created
#[derive(Debug, Clone, PartialEq)]
pub enum SupportingObject {
    Namespace(Namespace),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
}

impl SupportingObject {
    pub fn kind(&self) -> SupportingKind {
        match self {
            SupportingObject::Namespace(_) => SupportingKind::Namespace,
            SupportingObject::ServiceAccount(_) => SupportingKind::ServiceAccount,
            SupportingObject::Role(_) => SupportingKind::Role,
            SupportingObject::RoleBinding(_) => SupportingKind::RoleBinding,
        }
    }
}

/// Read/write access to the objects the controller manages
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Cached VirtualRouter, `None` when it does not exist
    async fn get_virtual_router(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Arc<VirtualRouter>>>;

    /// Write only the status of `router`. Fails with a conflict when the
    /// stored resourceVersion moved on.
    async fn update_virtual_router_status(&self, router: &VirtualRouter) -> Result<VirtualRouter>;

    /// Cached Deployment, `None` when it does not exist
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Arc<Deployment>>>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    /// Whether the supporting object `name` of `kind` exists. `namespace` is
    /// ignored for cluster-scoped kinds.
    async fn supporting_object_exists(
        &self,
        kind: SupportingKind,
        namespace: &str,
        name: &str,
    ) -> Result<bool>;

    async fn create_supporting_object(&self, object: &SupportingObject) -> Result<()>;
}
