use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Affinity;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// VirtualRouter describes one virtual router instance: a Deployment of
/// router pods living in a namespace named after the VirtualRouter
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "tmax.io",
    version = "v1",
    kind = "VirtualRouter",
    plural = "virtualrouters",
    shortname = "vr",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "VirtualRouterStatus",
    printcolumn = r#"{"name":"Deployment","type":"string","jsonPath":".spec.deploymentName"}"#,
    printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableReplicas"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterSpec {
    /// Name of the managed Deployment inside the private namespace
    pub deployment_name: String,

    /// Desired router replicas; unset leaves the replica count alone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Router container image
    #[serde(default)]
    pub image: String,

    /// Node labels the router pods must be scheduled onto
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Scheduling constraints, passed through to the pod spec untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
}

/// Status of a VirtualRouter
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterStatus {
    /// Available replicas of the managed Deployment
    #[serde(default)]
    pub available_replicas: i32,
}

impl VirtualRouter {
    /// Namespace holding every object managed for this VirtualRouter.
    ///
    /// It is named after the VirtualRouter itself.
    pub fn private_namespace(&self) -> String {
        self.name_any()
    }
}
