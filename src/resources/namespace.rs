//! Namespace generation for Addon-owned namespaces

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::Addon;
use crate::resources::common::{identity_labels, owner_reference};

/// Phase value of a Namespace that finished provisioning
pub const NAMESPACE_PHASE_ACTIVE: &str = "Active";

/// Label requesting OpenShift cluster-monitoring to scrape a namespace
pub const CLUSTER_MONITORING_LABEL: &str = "openshift.io/cluster-monitoring";

/// Generate a Namespace owned by the Addon
pub fn generate_namespace(addon: &Addon, name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(identity_labels(&addon.name_any())),
            owner_references: Some(vec![owner_reference(addon)]),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Generate the monitoring federation Namespace, additionally labeled for
/// cluster-monitoring ingestion
pub fn generate_monitoring_namespace(addon: &Addon, name: &str) -> Namespace {
    let mut labels = identity_labels(&addon.name_any());
    labels.insert(CLUSTER_MONITORING_LABEL.to_string(), "true".to_string());

    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(addon)]),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Whether the Namespace finished provisioning
pub fn is_namespace_active(ns: &Namespace) -> bool {
    ns.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|p| p == NAMESPACE_PHASE_ACTIVE)
}
