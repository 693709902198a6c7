//! Owner linkage between managed objects and their VirtualRouter
//!
//! Ownership is only ever read off the owned object's owner references and
//! resolved by name; no back-pointers are kept.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use virtualrouter_api::names::OWNER_NAMESPACE_ANNOTATION;
use virtualrouter_api::v1::KIND;
use virtualrouter_api::VirtualRouter;

use crate::{ControllerError, Result};

/// The owner reference flagged as the managing controller, if any
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.controller == Some(true))
}

/// Controller owner reference pointing at `router`
pub fn owner_reference(router: &VirtualRouter) -> Result<OwnerReference> {
    router
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::MissingUid(router.name_any()))
}

/// Whether `meta` names `router` as its controller, matched by uid
pub fn is_controlled_by(meta: &ObjectMeta, router: &VirtualRouter) -> bool {
    match (controller_of(meta), router.meta().uid.as_deref()) {
        (Some(owner), Some(uid)) => owner.uid == uid,
        _ => false,
    }
}

/// Namespace and name of the VirtualRouter controlling `obj`.
///
/// Managed objects live in the router's private namespace, so the router's
/// own namespace comes from the traceability annotation, falling back to the
/// object's namespace.
pub fn owning_router<K: Resource>(obj: &K) -> Option<(String, String)> {
    let owner = controller_of(obj.meta())?;
    if owner.kind != KIND {
        return None;
    }
    let namespace = obj
        .annotations()
        .get(OWNER_NAMESPACE_ANNOTATION)
        .cloned()
        .or_else(|| obj.namespace())
        .unwrap_or_default();
    Some((namespace, owner.name.clone()))
}
