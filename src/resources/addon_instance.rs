//! AddonInstance generation

use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{Addon, AddonInstance, AddonInstanceSpec, ADDON_INSTANCE_NAME};
use crate::resources::common::{identity_labels, owner_reference};

/// Generate the AddonInstance singleton for the Addon's target namespace
pub fn generate_addon_instance(addon: &Addon, target_namespace: &str) -> AddonInstance {
    AddonInstance {
        metadata: ObjectMeta {
            name: Some(ADDON_INSTANCE_NAME.to_string()),
            namespace: Some(target_namespace.to_string()),
            labels: Some(identity_labels(&addon.name_any())),
            owner_references: Some(vec![owner_reference(addon)]),
            ..Default::default()
        },
        spec: AddonInstanceSpec::default(),
        status: None,
    }
}
