//! Common utilities for managed resource generation
//!
//! Identity labels, owner references and derived names shared by every
//! resource the Addon reconciler manages.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::Addon;

/// API version for the Addon CRD
pub const API_VERSION: &str = "addons.managed.openshift.io/v1alpha1";

/// Kind for the Addon CRD
pub const KIND: &str = "Addon";

/// Operator field manager name for patches
pub const FIELD_MANAGER: &str = "addon-operator";

/// Finalizer keeping Addons alive until their downstream state is released
pub const CACHE_FINALIZER: &str = "addons.managed.openshift.io/cache";

/// Identity label: which operator manages a resource
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Identity label: which addon a resource belongs to
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Generate an owner reference marking the Addon as controller of a resource
pub fn owner_reference(addon: &Addon) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: addon.name_any(),
        uid: addon.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Identity labels carried by every resource owned by an Addon
pub fn identity_labels(addon_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string()),
        (INSTANCE_LABEL.to_string(), addon_name.to_string()),
    ])
}

/// Label selector string matching both identity labels
pub fn identity_selector(addon_name: &str) -> String {
    format!(
        "{}={},{}={}",
        MANAGED_BY_LABEL, FIELD_MANAGER, INSTANCE_LABEL, addon_name
    )
}

/// Namespace the federation monitoring stack lives in
pub fn monitoring_namespace_name(addon_name: &str) -> String {
    format!("redhat-monitoring-{}", addon_name)
}

/// Name of the federation ServiceMonitor
pub fn federated_service_monitor_name(addon_name: &str) -> String {
    format!("federated-sm-{}", addon_name)
}

/// Whether `meta` already names `desired` as its controller.
///
/// Compared by identity (apiVersion, kind, name), not by uid, so a
/// re-created owner still matches its adopted resources.
pub fn has_equal_controller_reference(meta: &ObjectMeta, desired: &OwnerReference) -> bool {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|r| r.controller.unwrap_or(false))
        .any(|r| {
            r.api_version == desired.api_version && r.kind == desired.kind && r.name == desired.name
        })
}

/// Replace any existing controller reference with `desired`, demoting the
/// previous controller to a plain owner.
pub fn set_controller_reference(meta: &mut ObjectMeta, desired: OwnerReference) {
    let mut refs = meta.owner_references.take().unwrap_or_default();
    for r in refs.iter_mut() {
        if r.controller.unwrap_or(false) {
            r.controller = Some(false);
        }
    }
    refs.retain(|r| {
        !(r.api_version == desired.api_version && r.kind == desired.kind && r.name == desired.name)
    });
    refs.push(desired);
    meta.owner_references = Some(refs);
}

/// Merge identity labels into existing metadata without dropping foreign
/// labels.
pub fn merge_identity_labels(meta: &mut ObjectMeta, addon_name: &str) {
    let mut labels = meta.labels.take().unwrap_or_default();
    for (k, v) in identity_labels(addon_name) {
        labels.insert(k, v);
    }
    meta.labels = Some(labels);
}

/// Merge patch adopting an existing resource: rewrites the controller
/// reference, merges identity labels and pins the observed
/// `resourceVersion` for optimistic locking.
pub fn adoption_patch(addon: &Addon, current: &ObjectMeta) -> serde_json::Value {
    let mut meta = current.clone();
    set_controller_reference(&mut meta, owner_reference(addon));
    merge_identity_labels(&mut meta, &addon.name_any());
    serde_json::json!({
        "metadata": {
            "labels": meta.labels,
            "ownerReferences": meta.owner_references,
            "resourceVersion": current.resource_version,
        }
    })
}
