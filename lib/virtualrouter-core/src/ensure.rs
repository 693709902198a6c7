//! Create-if-absent handling of a VirtualRouter's supporting objects
//!
//! Namespace, service account, role and role binding are created once with
//! an owner reference and never updated afterwards; manual edits stay.

use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::{debug, info};
use virtualrouter_api::names::{
    NETWORK_API_GROUP, ROLE_BINDING_NAME, ROLE_NAME, RULES_API_GROUP, RULE_RESOURCES,
    SERVICE_ACCOUNT_NAME, VPN_RESOURCE,
};

use crate::store::{ResourceStore, SupportingKind, SupportingObject};
use crate::Result;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
const FULL_VERBS: [&str; 7] = ["get", "list", "watch", "create", "update", "patch", "delete"];
const READ_VERBS: [&str; 3] = ["get", "list", "watch"];

/// What [`ensure`] found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Existing,
    Created,
}

impl SupportingKind {
    /// Fixed name of this kind of object inside `namespace`
    pub fn well_known_name<'a>(&self, namespace: &'a str) -> &'a str {
        match self {
            SupportingKind::Namespace => namespace,
            SupportingKind::ServiceAccount => SERVICE_ACCOUNT_NAME,
            SupportingKind::Role => ROLE_NAME,
            SupportingKind::RoleBinding => ROLE_BINDING_NAME,
        }
    }

    /// Desired object of this kind for the private `namespace`
    pub fn build(&self, namespace: &str, owner: OwnerReference) -> SupportingObject {
        let metadata = ObjectMeta {
            name: Some(self.well_known_name(namespace).to_string()),
            namespace: match self {
                SupportingKind::Namespace => None,
                _ => Some(namespace.to_string()),
            },
            owner_references: Some(vec![owner]),
            ..Default::default()
        };
        match self {
            SupportingKind::Namespace => SupportingObject::Namespace(Namespace {
                metadata,
                ..Default::default()
            }),
            SupportingKind::ServiceAccount => SupportingObject::ServiceAccount(ServiceAccount {
                metadata,
                ..Default::default()
            }),
            SupportingKind::Role => SupportingObject::Role(Role {
                metadata,
                rules: Some(router_rules()),
            }),
            SupportingKind::RoleBinding => SupportingObject::RoleBinding(RoleBinding {
                metadata,
                role_ref: RoleRef {
                    api_group: RBAC_API_GROUP.to_string(),
                    kind: "Role".to_string(),
                    name: ROLE_NAME.to_string(),
                },
                subjects: Some(vec![Subject {
                    kind: "ServiceAccount".to_string(),
                    name: SERVICE_ACCOUNT_NAME.to_string(),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                }]),
            }),
        }
    }
}

fn to_strings(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|v| v.to_string()).collect())
}

fn router_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: to_strings(&[RULES_API_GROUP]),
            resources: to_strings(&RULE_RESOURCES),
            verbs: FULL_VERBS.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        },
        PolicyRule {
            api_groups: to_strings(&[NETWORK_API_GROUP]),
            resources: to_strings(&[VPN_RESOURCE]),
            verbs: READ_VERBS.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        },
    ]
}

/// Make sure the `kind` object exists in `namespace`, creating it owned by
/// `owner` if it does not. Existing objects are left untouched.
pub async fn ensure(
    store: &dyn ResourceStore,
    kind: SupportingKind,
    namespace: &str,
    owner: &OwnerReference,
) -> Result<EnsureOutcome> {
    let name = kind.well_known_name(namespace);
    if store.supporting_object_exists(kind, namespace, name).await? {
        return Ok(EnsureOutcome::Existing);
    }

    let object = kind.build(namespace, owner.clone());
    if let Err(e) = store.create_supporting_object(&object).await {
        debug!(%kind, namespace, name, error = %e, "Failed to create supporting object");
        return Err(e);
    }
    info!(%kind, namespace, name, "Created supporting object");
    Ok(EnsureOutcome::Created)
}

/// Ensure every supporting object, in dependency order
pub async fn ensure_all(
    store: &dyn ResourceStore,
    namespace: &str,
    owner: &OwnerReference,
) -> Result<()> {
    for kind in SupportingKind::ORDERED {
        ensure(store, kind, namespace, owner).await?;
    }
    Ok(())
}
