//! OLM phases: OperatorGroup, CatalogSource readiness, Subscription and
//! CSV observation.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::csv_events::CsvKey;
use crate::controller::error::Result;
use crate::controller::phase::PhaseResult;
use crate::controller::status::StatusReporter;
use crate::controller::Context;
use crate::crd::{
    csv_phase, Addon, CatalogSource, ClusterServiceVersion, OperatorGroup, ResourceAdoptionStrategy,
    Subscription,
};
use crate::resources::common::{
    adoption_patch, has_equal_controller_reference, owner_reference, FIELD_MANAGER,
};
use crate::resources::olm::{generate_catalog_source, generate_operator_group, generate_subscription};

/// Registry state value gating the CatalogSource phase
const GRPC_STATE_READY: &str = "READY";

/// Outcome of reconciling one owned OLM object
enum Ensure<T> {
    Owned(T),
    Collided,
}

macro_rules! ensure_owned {
    ($api:expr, $addon:expr, $desired:expr, $kind:literal) => {{
        let name = $desired.name_any();
        match $api.get_opt(&name).await? {
            None => {
                let created = $api.create(&PostParams::default(), &$desired).await?;
                info!(addon = %$addon.name_any(), name = %name, concat!("Created ", $kind));
                Ensure::Owned(created)
            }
            Some(existing) => {
                if !has_equal_controller_reference(&existing.metadata, &owner_reference($addon)) {
                    match $addon.spec.resource_adoption_strategy {
                        ResourceAdoptionStrategy::Prevent => Ensure::Collided,
                        ResourceAdoptionStrategy::AdoptAll => {
                            let patch = adoption_patch($addon, &existing.metadata);
                            let adopted = $api
                                .patch(
                                    &name,
                                    &PatchParams::apply(FIELD_MANAGER),
                                    &Patch::Merge(&patch),
                                )
                                .await?;
                            info!(addon = %$addon.name_any(), name = %name, concat!("Adopted ", $kind));
                            Ensure::Owned(adopted)
                        }
                    }
                } else {
                    Ensure::Owned(existing)
                }
            }
        }
    }};
}

async fn update_spec_if_changed<T, S>(
    api: &Api<T>,
    name: &str,
    current: &S,
    desired: &S,
) -> Result<bool>
where
    T: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    S: PartialEq + serde::Serialize,
{
    if current == desired {
        return Ok(false);
    }
    let patch = serde_json::json!({ "spec": desired });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}

/// Ensure the OperatorGroup shaping which namespaces the addon operator may
/// watch.
pub async fn ensure_operator_group(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let Some(install) = addon.valid_install_spec() else {
        reporter.report_configuration_error("install parameters are incomplete");
        return Ok(PhaseResult::Stop);
    };

    let desired = generate_operator_group(addon, install);
    let api: Api<OperatorGroup> = Api::namespaced(ctx.client.clone(), &install.namespace);

    match ensure_owned!(api, addon, desired, "OperatorGroup") {
        Ensure::Collided => {
            reporter.report_collided_namespaces(&format!(
                "OperatorGroup {} has a conflicting owner",
                desired.name_any()
            ));
            Ok(PhaseResult::Retry)
        }
        Ensure::Owned(existing) => {
            update_spec_if_changed(&api, &desired.name_any(), &existing.spec, &desired.spec)
                .await?;
            Ok(PhaseResult::Continue)
        }
    }
}

/// Ensure the CatalogSource and gate on its registry connection reaching
/// `READY`.
pub async fn ensure_catalog_source(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let Some(install) = addon.valid_install_spec() else {
        reporter.report_configuration_error("install parameters are incomplete");
        return Ok(PhaseResult::Stop);
    };

    let desired = generate_catalog_source(addon, install);
    let api: Api<CatalogSource> = Api::namespaced(ctx.client.clone(), &install.namespace);

    let observed = match ensure_owned!(api, addon, desired, "CatalogSource") {
        Ensure::Collided => {
            reporter.report_collided_namespaces(&format!(
                "CatalogSource {} has a conflicting owner",
                desired.name_any()
            ));
            return Ok(PhaseResult::Retry);
        }
        Ensure::Owned(existing) => {
            update_spec_if_changed(&api, &desired.name_any(), &existing.spec, &desired.spec)
                .await?;
            existing
        }
    };

    // The connection state is informational and may oscillate; transitions
    // re-enqueue through the CatalogSource watch
    let state = observed
        .status
        .as_ref()
        .and_then(|s| s.grpc_connection_state.as_ref())
        .and_then(|g| g.last_observed_state.as_deref());

    match state {
        Some(GRPC_STATE_READY) => Ok(PhaseResult::Continue),
        other => {
            reporter.report_unready_catalog_source(&format!(
                "CatalogSource connection state is {:?}, waiting for READY",
                other.unwrap_or("unknown")
            ));
            Ok(PhaseResult::Retry)
        }
    }
}

/// Ensure the Subscription and install the CSV → Addon mapping.
///
/// Returns the key of the current CSV when the subscription has resolved
/// one, for the follow-up CSV observation phase.
pub async fn ensure_subscription(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<(PhaseResult, Option<CsvKey>)> {
    let Some(install) = addon.valid_install_spec() else {
        reporter.report_configuration_error("install parameters are incomplete");
        return Ok((PhaseResult::Stop, None));
    };

    let mut desired = generate_subscription(addon, install);
    let api: Api<Subscription> = Api::namespaced(ctx.client.clone(), &install.namespace);

    let observed = match ensure_owned!(api, addon, desired, "Subscription") {
        Ensure::Collided => {
            reporter.report_collided_namespaces(&format!(
                "Subscription {} has a conflicting owner",
                desired.name_any()
            ));
            return Ok((PhaseResult::Retry, None));
        }
        Ensure::Owned(existing) => {
            // installPlanApproval is tenant-owned; carry the observed value
            // into the desired spec before diffing
            desired.spec.install_plan_approval = existing.spec.install_plan_approval.clone();
            update_spec_if_changed(&api, &desired.name_any(), &existing.spec, &desired.spec)
                .await?;
            existing
        }
    };

    let installed_csv = observed
        .status
        .as_ref()
        .and_then(|s| s.installed_csv.clone())
        .unwrap_or_default();
    let current_csv = observed
        .status
        .as_ref()
        .and_then(|s| s.current_csv.clone())
        .unwrap_or_default();

    if installed_csv.is_empty() || current_csv.is_empty() {
        reporter.report_pending_subscription();
        return Ok((PhaseResult::Retry, None));
    }

    let keys = vec![
        CsvKey::new(&install.namespace, &installed_csv),
        CsvKey::new(&install.namespace, &current_csv),
    ];
    let current_key = CsvKey::new(&install.namespace, &current_csv);

    if ctx.runtime.csv_events.replace_map(&addon.name_any(), &keys) {
        // CSV events observed before the mapping existed may have been
        // dropped; reconciling again guarantees convergence
        debug!(addon = %addon.name_any(), "CSV mapping changed, retrying");
        reporter.report_unready_csv("CSV mapping updated, awaiting observation.");
        return Ok((PhaseResult::Retry, Some(current_key)));
    }

    Ok((PhaseResult::Continue, Some(current_key)))
}

/// Map the current CSV's install phase onto the pipeline outcome.
pub async fn observe_current_csv(
    ctx: &Context,
    reporter: &mut StatusReporter,
    csv_key: &CsvKey,
) -> Result<PhaseResult> {
    let api: Api<ClusterServiceVersion> =
        Api::namespaced(ctx.client.clone(), &csv_key.namespace);

    let phase = api
        .get_opt(&csv_key.name)
        .await?
        .and_then(|csv| csv.status)
        .and_then(|s| s.phase);

    match phase.as_deref() {
        Some(csv_phase::SUCCEEDED) => Ok(PhaseResult::Continue),
        Some(csv_phase::FAILED) => {
            reporter.report_unready_csv("failed");
            Ok(PhaseResult::Retry)
        }
        _ => {
            reporter.report_unready_csv("unknown/pending");
            Ok(PhaseResult::Retry)
        }
    }
}
