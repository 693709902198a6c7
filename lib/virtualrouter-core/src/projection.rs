//! Desired state derived from a VirtualRouter
//!
//! Pure functions shared by the create and update paths, so both always
//! converge on the same object.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, PodSpec, PodTemplateSpec, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;
use virtualrouter_api::names::{
    APP_LABEL_KEY, APP_LABEL_VALUE, DAEMON_FINALIZER, OWNER_NAMESPACE_ANNOTATION,
    OWNER_NAME_ANNOTATION, POD_NAMESPACE_ENV, SERVICE_ACCOUNT_NAME,
};
use virtualrouter_api::{VirtualRouter, VirtualRouterStatus};

/// Capabilities the router needs to program interfaces, routes and netfilter
const ROUTER_CAPABILITIES: [&str; 3] = ["NET_RAW", "NET_ADMIN", "SYS_ADMIN"];

fn workload_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string())])
}

fn owner_annotations(router: &VirtualRouter) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNER_NAME_ANNOTATION.to_string(), router.name_any()),
        (
            OWNER_NAMESPACE_ANNOTATION.to_string(),
            router.namespace().unwrap_or_default(),
        ),
    ])
}

/// Deployment running `router` inside `namespace`
pub fn project_deployment(
    namespace: &str,
    router: &VirtualRouter,
    owner: OwnerReference,
) -> Deployment {
    let labels = workload_labels();
    let container = Container {
        name: router.name_any(),
        image: Some(router.spec.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(vec![EnvVar {
            name: POD_NAMESPACE_ENV.to_string(),
            value: Some(namespace.to_string()),
            value_from: None,
        }]),
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                add: Some(ROUTER_CAPABILITIES.iter().map(|c| c.to_string()).collect()),
                drop: None,
            }),
            privileged: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(router.spec.deployment_name.clone()),
            namespace: Some(namespace.to_string()),
            annotations: Some(owner_annotations(router)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: router.spec.replicas,
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(owner_annotations(router)),
                    finalizers: Some(vec![DAEMON_FINALIZER.to_string()]),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: router.spec.affinity.clone(),
                    service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
                    node_selector: Some(router.spec.node_selector.clone()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Status of `router` as observed through its Deployment
pub fn project_status(deployment: &Deployment) -> VirtualRouterStatus {
    VirtualRouterStatus {
        available_replicas: deployment
            .status
            .as_ref()
            .and_then(|status| status.available_replicas)
            .unwrap_or(0),
    }
}

/// Replica count of an existing Deployment
pub fn observed_replicas(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|spec| spec.replicas)
}
