//! In-memory stand-ins for the cluster used by unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use kube_runtime::events::EventType;
use virtualrouter_api::VirtualRouter;

use crate::events::EventRecorder;
use crate::store::{ResourceStore, SupportingKind, SupportingObject};
use crate::Result;

/// Write issued against the fake store
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    CreateSupporting(SupportingKind, String),
    CreateDeployment(String),
    UpdateDeployment { name: String, replicas: Option<i32> },
    UpdateStatus { name: String, available_replicas: i32 },
}

#[derive(Default)]
struct State {
    routers: HashMap<(String, String), Arc<VirtualRouter>>,
    deployments: HashMap<(String, String), Arc<Deployment>>,
    supporting: HashSet<(SupportingKind, String, String)>,
    writes: Vec<Write>,
    available_replicas: i32,
    fail_next_read: bool,
    fail_writes: bool,
    next_version: u64,
}

impl State {
    fn version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

fn api_error(code: u16, reason: &str) -> crate::ControllerError {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    })
    .into()
}

fn key_of(obj: &impl ResourceExt) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Store keeping objects in memory and logging every write
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a VirtualRouter, assigning uid and resourceVersion if unset
    pub fn insert_router(&self, mut router: VirtualRouter) -> Arc<VirtualRouter> {
        let mut state = self.state.lock().unwrap();
        if router.metadata.uid.is_none() {
            router.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        if router.metadata.resource_version.is_none() {
            router.metadata.resource_version = Some(state.version());
        }
        let router = Arc::new(router);
        state.routers.insert(key_of(router.as_ref()), Arc::clone(&router));
        router
    }

    pub fn remove_router(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.routers.remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn router(&self, namespace: &str, name: &str) -> Option<Arc<VirtualRouter>> {
        let state = self.state.lock().unwrap();
        state.routers.get(&(namespace.to_string(), name.to_string())).cloned()
    }

    pub fn insert_deployment(&self, mut deployment: Deployment) {
        let mut state = self.state.lock().unwrap();
        deployment.metadata.resource_version = Some(state.version());
        state.deployments.insert(key_of(&deployment), Arc::new(deployment));
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Arc<Deployment>> {
        let state = self.state.lock().unwrap();
        state.deployments.get(&(namespace.to_string(), name.to_string())).cloned()
    }

    pub fn insert_supporting(&self, kind: SupportingKind, namespace: &str, name: &str) {
        let namespace = match kind {
            SupportingKind::Namespace => "",
            _ => namespace,
        };
        let mut state = self.state.lock().unwrap();
        state
            .supporting
            .insert((kind, namespace.to_string(), name.to_string()));
    }

    /// Available replicas reported on Deployments created or updated from now on
    pub fn set_available_replicas(&self, available: i32) {
        self.state.lock().unwrap().available_replicas = available;
    }

    pub fn fail_next_read(&self) {
        self.state.lock().unwrap().fail_next_read = true;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    fn check_read(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_read) {
            return Err(api_error(503, "ServiceUnavailable"));
        }
        Ok(())
    }

    fn check_write(state: &State) -> Result<()> {
        if state.fail_writes {
            return Err(api_error(500, "InternalError"));
        }
        Ok(())
    }

    fn observe(state: &mut State, mut deployment: Deployment) -> Deployment {
        deployment.metadata.resource_version = Some(state.version());
        deployment.status = Some(DeploymentStatus {
            available_replicas: Some(state.available_replicas),
            ..Default::default()
        });
        deployment
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get_virtual_router(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Arc<VirtualRouter>>> {
        self.check_read()?;
        Ok(self.router(namespace, name))
    }

    async fn update_virtual_router_status(&self, router: &VirtualRouter) -> Result<VirtualRouter> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state)?;
        let key = key_of(router);
        let stored = state
            .routers
            .get(&key)
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if stored.metadata.resource_version != router.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }

        let mut updated = (*stored).clone();
        updated.status = router.status.clone();
        updated.metadata.resource_version = Some(state.version());
        state.writes.push(Write::UpdateStatus {
            name: router.name_any(),
            available_replicas: router.status.as_ref().map_or(0, |s| s.available_replicas),
        });
        state.routers.insert(key, Arc::new(updated.clone()));
        Ok(updated)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Arc<Deployment>>> {
        self.check_read()?;
        Ok(self.deployment(namespace, name))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state)?;
        let key = key_of(deployment);
        if state.deployments.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let created = Self::observe(&mut state, deployment.clone());
        state.writes.push(Write::CreateDeployment(deployment.name_any()));
        state.deployments.insert(key, Arc::new(created.clone()));
        Ok(created)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state)?;
        let key = key_of(deployment);
        if !state.deployments.contains_key(&key) {
            return Err(api_error(404, "NotFound"));
        }
        let updated = Self::observe(&mut state, deployment.clone());
        state.writes.push(Write::UpdateDeployment {
            name: deployment.name_any(),
            replicas: deployment.spec.as_ref().and_then(|s| s.replicas),
        });
        state.deployments.insert(key, Arc::new(updated.clone()));
        Ok(updated)
    }

    async fn supporting_object_exists(
        &self,
        kind: SupportingKind,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        self.check_read()?;
        let namespace = match kind {
            SupportingKind::Namespace => "",
            _ => namespace,
        };
        let state = self.state.lock().unwrap();
        Ok(state
            .supporting
            .contains(&(kind, namespace.to_string(), name.to_string())))
    }

    async fn create_supporting_object(&self, object: &SupportingObject) -> Result<()> {
        let (kind, namespace, name) = match object {
            SupportingObject::Namespace(o) => (object.kind(), String::new(), o.name_any()),
            SupportingObject::ServiceAccount(o) => {
                (object.kind(), o.namespace().unwrap_or_default(), o.name_any())
            }
            SupportingObject::Role(o) => (object.kind(), o.namespace().unwrap_or_default(), o.name_any()),
            SupportingObject::RoleBinding(o) => {
                (object.kind(), o.namespace().unwrap_or_default(), o.name_any())
            }
        };
        let mut state = self.state.lock().unwrap();
        Self::check_write(&state)?;
        if !state.supporting.insert((kind, namespace, name.clone())) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.writes.push(Write::CreateSupporting(kind, name));
        Ok(())
    }
}

/// Event recorded by [`FakeRecorder`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub subject: String,
    pub type_: EventType,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
pub struct FakeRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl FakeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

impl EventRecorder for FakeRecorder {
    fn record(&self, subject: &VirtualRouter, type_: EventType, reason: &str, note: String) {
        self.events.lock().unwrap().push(RecordedEvent {
            subject: subject.name_any(),
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}
