//! OLM resource generation: OperatorGroup, CatalogSource, Subscription

use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{
    Addon, CatalogSource, CatalogSourceSpec, InstallSpec, OperatorGroup, OperatorGroupSpec,
    Subscription, SubscriptionConfig, SubscriptionSpec,
};
use crate::resources::common::{identity_labels, owner_reference};

/// Publisher stamped on every CatalogSource this operator creates
pub const CATALOG_SOURCE_PUBLISHER: &str = "OSD Red Hat Addons";

/// OLM source type for gRPC-served catalog images
pub const CATALOG_SOURCE_TYPE_GRPC: &str = "grpc";

fn olm_metadata(addon: &Addon, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(addon.name_any()),
        namespace: Some(namespace.to_string()),
        labels: Some(identity_labels(&addon.name_any())),
        owner_references: Some(vec![owner_reference(addon)]),
        ..Default::default()
    }
}

/// Generate the OperatorGroup for the Addon's target namespace.
///
/// Own-namespace installs restrict the group to the target namespace; the
/// all-namespaces mode leaves the target list empty.
pub fn generate_operator_group(addon: &Addon, install: &InstallSpec) -> OperatorGroup {
    let target_namespaces = if addon.spec.install.is_own_namespace() {
        vec![install.namespace.clone()]
    } else {
        vec![]
    };

    OperatorGroup {
        metadata: olm_metadata(addon, &install.namespace),
        spec: OperatorGroupSpec { target_namespaces },
    }
}

/// Generate the CatalogSource serving the Addon's catalog image
pub fn generate_catalog_source(addon: &Addon, install: &InstallSpec) -> CatalogSource {
    CatalogSource {
        metadata: olm_metadata(addon, &install.namespace),
        spec: CatalogSourceSpec {
            source_type: CATALOG_SOURCE_TYPE_GRPC.to_string(),
            image: install.catalog_source_image.clone(),
            display_name: Some(addon.spec.display_name.clone()),
            publisher: Some(CATALOG_SOURCE_PUBLISHER.to_string()),
        },
        status: None,
    }
}

/// Generate the Subscription installing the Addon's package.
///
/// `installPlanApproval` is deliberately left unset here; the reconciler
/// copies the observed value before diffing so tenant choices survive.
pub fn generate_subscription(addon: &Addon, install: &InstallSpec) -> Subscription {
    let config = if install.env.is_empty() {
        None
    } else {
        Some(SubscriptionConfig {
            env: install.env.clone(),
        })
    };

    Subscription {
        metadata: olm_metadata(addon, &install.namespace),
        spec: SubscriptionSpec {
            source: addon.name_any(),
            source_namespace: install.namespace.clone(),
            name: install.package_name.clone(),
            channel: install.channel.clone(),
            install_plan_approval: None,
            config,
        },
        status: None,
    }
}
