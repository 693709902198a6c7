//! `namespace/name` work item keys

use kube::{Resource, ResourceExt};

use crate::{ControllerError, Result};

/// Key of a namespaced object: `namespace/name`, or `name` when cluster-scoped
pub fn meta_namespace_key<K: Resource>(obj: &K) -> Result<String> {
    let name = obj
        .meta()
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ControllerError::InvalidKey("object has no name".to_string()))?;
    Ok(match obj.namespace() {
        Some(namespace) if !namespace.is_empty() => format!("{}/{}", namespace, name),
        _ => name.to_string(),
    })
}

/// Split a key produced by [`meta_namespace_key`] into namespace and name.
///
/// The namespace is empty for cluster-scoped keys.
pub fn split_meta_namespace_key(key: &str) -> Result<(&str, &str)> {
    let (namespace, name) = match key.split_once('/') {
        None => ("", key),
        Some((_, rest)) if rest.contains('/') => {
            return Err(ControllerError::InvalidKey(key.to_string()))
        }
        Some(parts) => parts,
    };
    if name.is_empty() {
        return Err(ControllerError::InvalidKey(key.to_string()));
    }
    Ok((namespace, name))
}
