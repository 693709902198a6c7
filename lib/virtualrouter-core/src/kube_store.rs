//! [`ResourceStore`] backed by the Kubernetes API and reflector caches

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::{ObjectRef, Store};
use tracing::debug;
use virtualrouter_api::VirtualRouter;

use crate::store::{ResourceStore, SupportingKind, SupportingObject};
use crate::{ControllerError, Result};

/// Kubernetes-backed store.
///
/// VirtualRouters and Deployments are read from informer caches; supporting
/// objects are read straight from the API since nothing watches them.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    routers: Store<VirtualRouter>,
    deployments: Store<Deployment>,
}

impl KubeStore {
    pub fn new(client: Client, routers: Store<VirtualRouter>, deployments: Store<Deployment>) -> Self {
        Self {
            client,
            routers,
            deployments,
        }
    }

    fn namespace_of(obj: &impl Resource, kind: &str) -> Result<String> {
        obj.namespace().ok_or_else(|| {
            ControllerError::Internal(format!("{} {} has no namespace", kind, obj.name_any()))
        })
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_virtual_router(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Arc<VirtualRouter>>> {
        Ok(self.routers.get(&ObjectRef::new(name).within(namespace)))
    }

    async fn update_virtual_router_status(&self, router: &VirtualRouter) -> Result<VirtualRouter> {
        let namespace = Self::namespace_of(router, "VirtualRouter")?;
        let api: Api<VirtualRouter> = Api::namespaced(self.client.clone(), &namespace);
        let data = serde_json::to_vec(router)?;
        Ok(api
            .replace_status(&router.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Arc<Deployment>>> {
        Ok(self.deployments.get(&ObjectRef::new(name).within(namespace)))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = Self::namespace_of(deployment, "Deployment")?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), deployment).await?)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let namespace = Self::namespace_of(deployment, "Deployment")?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api
            .replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await?)
    }

    async fn supporting_object_exists(
        &self,
        kind: SupportingKind,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        let client = self.client.clone();
        let found = match kind {
            SupportingKind::Namespace => Api::<Namespace>::all(client).get_opt(name).await?.is_some(),
            SupportingKind::ServiceAccount => Api::<ServiceAccount>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .is_some(),
            SupportingKind::Role => Api::<Role>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .is_some(),
            SupportingKind::RoleBinding => Api::<RoleBinding>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .is_some(),
        };
        debug!(%kind, namespace, name, found, "Looked up supporting object");
        Ok(found)
    }

    async fn create_supporting_object(&self, object: &SupportingObject) -> Result<()> {
        let client = self.client.clone();
        let pp = PostParams::default();
        match object {
            SupportingObject::Namespace(ns) => {
                Api::<Namespace>::all(client).create(&pp, ns).await?;
            }
            SupportingObject::ServiceAccount(sa) => {
                let namespace = Self::namespace_of(sa, "ServiceAccount")?;
                Api::<ServiceAccount>::namespaced(client, &namespace)
                    .create(&pp, sa)
                    .await?;
            }
            SupportingObject::Role(role) => {
                let namespace = Self::namespace_of(role, "Role")?;
                Api::<Role>::namespaced(client, &namespace).create(&pp, role).await?;
            }
            SupportingObject::RoleBinding(binding) => {
                let namespace = Self::namespace_of(binding, "RoleBinding")?;
                Api::<RoleBinding>::namespaced(client, &namespace)
                    .create(&pp, binding)
                    .await?;
            }
        }
        Ok(())
    }
}
