//! Monitoring federation phases: namespace plus ServiceMonitor, and the
//! retirement path when federation is switched off.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::error::{ignore_not_found, Result};
use crate::controller::phase::PhaseResult;
use crate::controller::status::StatusReporter;
use crate::controller::Context;
use crate::crd::{Addon, MonitoringFederationSpec, ResourceAdoptionStrategy, ServiceMonitor};
use crate::resources::common::{
    adoption_patch, federated_service_monitor_name, has_equal_controller_reference,
    identity_selector, monitoring_namespace_name, owner_reference, FIELD_MANAGER,
};
use crate::resources::monitoring::generate_federation_service_monitor;
use crate::resources::namespace::{generate_monitoring_namespace, is_namespace_active};

async fn ensure_monitoring_namespace(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let name = monitoring_namespace_name(&addon.name_any());
    let api: Api<Namespace> = Api::all(ctx.client.clone());
    let desired = generate_monitoring_namespace(addon, &name);

    let observed = match api.get_opt(&name).await? {
        None => {
            let created = api.create(&PostParams::default(), &desired).await?;
            info!(addon = %addon.name_any(), namespace = %name, "Created monitoring namespace");
            created
        }
        Some(existing) => {
            if has_equal_controller_reference(&existing.metadata, &owner_reference(addon)) {
                existing
            } else {
                match addon.spec.resource_adoption_strategy {
                    ResourceAdoptionStrategy::Prevent => {
                        reporter.report_unready_monitoring(&format!(
                            "Monitoring namespace {} has a conflicting owner",
                            name
                        ));
                        return Ok(PhaseResult::Retry);
                    }
                    ResourceAdoptionStrategy::AdoptAll => {
                        let patch = adoption_patch(addon, &existing.metadata);
                        api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                            .await?
                    }
                }
            }
        }
    };

    if !is_namespace_active(&observed) {
        reporter.report_unready_monitoring(&format!(
            "Monitoring namespace {} is not yet Active",
            name
        ));
        return Ok(PhaseResult::Retry);
    }

    Ok(PhaseResult::Continue)
}

async fn ensure_service_monitor(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
    federation: &MonitoringFederationSpec,
) -> Result<PhaseResult> {
    let desired = generate_federation_service_monitor(addon, federation);
    let namespace = desired.metadata.namespace.clone().unwrap_or_default();
    let name = desired.name_any();
    let api: Api<ServiceMonitor> = Api::namespaced(ctx.client.clone(), &namespace);

    match api.get_opt(&name).await? {
        None => {
            api.create(&PostParams::default(), &desired).await?;
            info!(addon = %addon.name_any(), name = %name, "Created federation ServiceMonitor");
        }
        Some(existing) => {
            if !has_equal_controller_reference(&existing.metadata, &owner_reference(addon)) {
                match addon.spec.resource_adoption_strategy {
                    ResourceAdoptionStrategy::Prevent => {
                        reporter.report_unready_monitoring(&format!(
                            "ServiceMonitor {} has a conflicting owner",
                            name
                        ));
                        return Ok(PhaseResult::Retry);
                    }
                    ResourceAdoptionStrategy::AdoptAll => {
                        let patch = adoption_patch(addon, &existing.metadata);
                        api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                            .await?;
                    }
                }
            }
            if existing.spec != desired.spec {
                let patch = serde_json::json!({ "spec": desired.spec });
                api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                    .await?;
            }
        }
    }

    Ok(PhaseResult::Continue)
}

/// Ensure the federation monitoring namespace and ServiceMonitor. Skipped
/// entirely when the spec carries no federation block.
pub async fn ensure_monitoring_federation(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let Some(federation) = addon
        .spec
        .monitoring
        .as_ref()
        .and_then(|m| m.federation.as_ref())
    else {
        return Ok(PhaseResult::Continue);
    };

    let result = ensure_monitoring_namespace(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    ensure_service_monitor(ctx, addon, reporter, federation).await
}

/// Delete ServiceMonitors the spec no longer wants. When no monitor is
/// wanted at all, the monitoring namespace is retired as well. This also
/// fires when only the wanted name changed, matching long-standing behavior
/// downstream tooling relies on.
pub async fn delete_unwanted_monitoring_federation(
    ctx: &Context,
    addon: &Addon,
) -> Result<PhaseResult> {
    let addon_name = addon.name_any();
    let wanted_name = if addon
        .spec
        .monitoring
        .as_ref()
        .and_then(|m| m.federation.as_ref())
        .is_some()
    {
        federated_service_monitor_name(&addon_name)
    } else {
        String::new()
    };

    let monitors: Api<ServiceMonitor> = Api::all(ctx.client.clone());
    let owned = monitors
        .list(&ListParams::default().labels(&identity_selector(&addon_name)))
        .await?;

    for sm in owned.items {
        if sm.name_any() == wanted_name {
            continue;
        }
        let namespace = sm.metadata.namespace.clone().unwrap_or_default();
        let scoped: Api<ServiceMonitor> = Api::namespaced(ctx.client.clone(), &namespace);
        debug!(addon = %addon_name, name = %sm.name_any(), "Deleting unwanted ServiceMonitor");
        ignore_not_found(
            scoped
                .delete(&sm.name_any(), &DeleteParams::default())
                .await
                .map(|_| ()),
        )?;
    }

    if wanted_name.is_empty() {
        let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
        ignore_not_found(
            namespaces
                .delete(&monitoring_namespace_name(&addon_name), &DeleteParams::default())
                .await
                .map(|_| ()),
        )?;
    }

    Ok(PhaseResult::Continue)
}
