//! AddonInstance phase: ensure the per-namespace heartbeat singleton.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use tracing::info;

use crate::controller::error::Result;
use crate::controller::phase::PhaseResult;
use crate::controller::status::StatusReporter;
use crate::controller::Context;
use crate::crd::{Addon, AddonInstance};
use crate::resources::addon_instance::generate_addon_instance;
use crate::resources::common::FIELD_MANAGER;

/// Create the AddonInstance if absent, update it only when the spec differs.
pub async fn ensure_addon_instance(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let Some(install) = addon.valid_install_spec() else {
        reporter.report_configuration_error("install parameters are incomplete");
        return Ok(PhaseResult::Stop);
    };

    let desired = generate_addon_instance(addon, &install.namespace);
    let api: Api<AddonInstance> = Api::namespaced(ctx.client.clone(), &install.namespace);
    let name = desired.name_any();

    match api.get_opt(&name).await? {
        None => {
            api.create(&PostParams::default(), &desired).await?;
            info!(addon = %addon.name_any(), namespace = %install.namespace, "Created AddonInstance");
        }
        Some(existing) if existing.spec != desired.spec => {
            let patch = serde_json::json!({ "spec": desired.spec });
            api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await?;
        }
        Some(_) => {}
    }

    Ok(PhaseResult::Continue)
}
