//! Owner-reference strategy for the revision engine.
//!
//! Ownership is tracked by uid so that adoption can distinguish two
//! same-named revisions, and released without deleting the object.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Client, Config, Resource, ResourceExt};

use crate::crd::{ObjectDeployment, ObjectSet};

/// Owner reference naming an ObjectSet as controller
pub fn object_set_owner_reference(object_set: &ObjectSet) -> OwnerReference {
    OwnerReference {
        api_version: ObjectSet::api_version(&()).to_string(),
        kind: ObjectSet::kind(&()).to_string(),
        name: object_set.name_any(),
        uid: object_set.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Uid of the current controller owner, if any
pub fn controller_uid(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| r.controller.unwrap_or(false))
        .map(|r| r.uid.as_str())
}

/// Whether the object is controlled by the owner with the given uid
pub fn is_controlled_by(meta: &ObjectMeta, uid: &str) -> bool {
    controller_uid(meta) == Some(uid)
}

/// Make `owner` the controller, demoting any current controller to a plain
/// owner reference.
pub fn set_controller(meta: &mut ObjectMeta, owner: OwnerReference) {
    let mut refs = meta.owner_references.take().unwrap_or_default();
    for r in refs.iter_mut() {
        if r.controller.unwrap_or(false) {
            r.controller = Some(false);
        }
    }
    if let Some(existing) = refs.iter_mut().find(|r| r.uid == owner.uid) {
        existing.controller = Some(true);
    } else {
        refs.push(owner);
    }
    meta.owner_references = Some(refs);
}

/// Drop the owner reference with the given uid entirely
pub fn remove_owner(meta: &mut ObjectMeta, uid: &str) {
    if let Some(refs) = meta.owner_references.as_mut() {
        refs.retain(|r| r.uid != uid);
    }
}

/// Synthetic identity attached to writes made on behalf of a managed owner
/// chain root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Impersonation {
    pub user: String,
    pub groups: Vec<String>,
}

/// Derive the impersonation identity for a managed object's root owner.
///
/// Users look like `pko:<kind>:<namespace>:<name>` (namespace segment
/// omitted for cluster-scoped roots); groups carry the kind plural and, for
/// namespaced roots, the namespace.
pub fn impersonation_for(
    kind: &str,
    plural: &str,
    namespace: Option<&str>,
    name: &str,
) -> Impersonation {
    let kind = kind.to_lowercase();
    match namespace {
        Some(ns) => Impersonation {
            user: format!("pko:{}:{}:{}", kind, ns, name),
            groups: vec![format!("pko:{}", plural), format!("pko:{}:{}", plural, ns)],
        },
        None => Impersonation {
            user: format!("pko:{}:{}", kind, name),
            groups: vec![format!("pko:{}", plural)],
        },
    }
}

/// Impersonation identity for phase writes made on behalf of an ObjectSet.
///
/// The root of the managed owner chain is the controlling ObjectDeployment
/// when one exists; a standalone ObjectSet is its own root.
pub fn object_set_impersonation(object_set: &ObjectSet) -> Impersonation {
    let namespace = object_set.namespace();
    let controller = object_set
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| r.controller.unwrap_or(false));

    match controller {
        Some(r) if r.kind == ObjectDeployment::kind(&()) => impersonation_for(
            &ObjectDeployment::kind(&()),
            &ObjectDeployment::plural(&()),
            namespace.as_deref(),
            &r.name,
        ),
        _ => impersonation_for(
            &ObjectSet::kind(&()),
            &ObjectSet::plural(&()),
            namespace.as_deref(),
            &object_set.name_any(),
        ),
    }
}

/// Build a client whose requests carry the impersonation headers.
pub fn impersonated_client(
    mut config: Config,
    impersonation: &Impersonation,
) -> Result<Client, kube::Error> {
    config.auth_info.impersonate = Some(impersonation.user.clone());
    config.auth_info.impersonate_groups = Some(impersonation.groups.clone());
    Client::try_from(config)
}
