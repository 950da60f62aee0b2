//! Namespace phases: ensure every wanted namespace exists and is owned by
//! the Addon, then retire namespaces the spec no longer wants.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::error::{ignore_not_found, Result};
use crate::controller::phase::PhaseResult;
use crate::controller::status::StatusReporter;
use crate::controller::Context;
use crate::crd::{Addon, ResourceAdoptionStrategy};
use crate::resources::common::{
    adoption_patch, has_equal_controller_reference, identity_selector, monitoring_namespace_name,
    owner_reference, FIELD_MANAGER,
};
use crate::resources::namespace::{generate_namespace, is_namespace_active};

enum EnsureOutcome {
    Owned(Namespace),
    Collided,
}

async fn ensure_namespace(ctx: &Context, addon: &Addon, name: &str) -> Result<EnsureOutcome> {
    let api: Api<Namespace> = Api::all(ctx.client.clone());
    let desired = generate_namespace(addon, name);

    let Some(existing) = api.get_opt(name).await? else {
        let created = api.create(&PostParams::default(), &desired).await?;
        info!(addon = %addon.name_any(), namespace = name, "Created namespace");
        return Ok(EnsureOutcome::Owned(created));
    };

    if has_equal_controller_reference(&existing.metadata, &owner_reference(addon)) {
        return Ok(EnsureOutcome::Owned(existing));
    }

    match addon.spec.resource_adoption_strategy {
        ResourceAdoptionStrategy::Prevent => Ok(EnsureOutcome::Collided),
        ResourceAdoptionStrategy::AdoptAll => {
            let patch = adoption_patch(addon, &existing.metadata);
            let adopted = api
                .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await?;
            info!(addon = %addon.name_any(), namespace = name, "Adopted namespace");
            Ok(EnsureOutcome::Owned(adopted))
        }
    }
}

/// Ensure every namespace in the spec exists, is owned and is Active.
pub async fn ensure_wanted_namespaces(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let mut collided = Vec::new();
    let mut unready = Vec::new();

    for ns in &addon.spec.namespaces {
        match ensure_namespace(ctx, addon, &ns.name).await? {
            EnsureOutcome::Collided => collided.push(ns.name.clone()),
            EnsureOutcome::Owned(namespace) => {
                if !is_namespace_active(&namespace) {
                    unready.push(ns.name.clone());
                }
            }
        }
    }

    if !collided.is_empty() {
        reporter.report_collided_namespaces(&format!(
            "Namespaces with conflicting owners: {}",
            collided.join(", ")
        ));
        return Ok(PhaseResult::Retry);
    }

    if !unready.is_empty() {
        reporter.report_unready_namespaces(&unready);
        // The namespace watch re-enqueues once they turn Active
        return Ok(PhaseResult::Continue);
    }

    Ok(PhaseResult::Continue)
}

/// Delete namespaces carrying this Addon's identity labels that the spec no
/// longer wants. The monitoring namespace is retired by the monitoring
/// phase, never here.
pub async fn delete_unwanted_namespaces(ctx: &Context, addon: &Addon) -> Result<PhaseResult> {
    let api: Api<Namespace> = Api::all(ctx.client.clone());
    let owned = api
        .list(&ListParams::default().labels(&identity_selector(&addon.name_any())))
        .await?;

    let mut wanted: Vec<String> = addon.spec.namespaces.iter().map(|n| n.name.clone()).collect();
    wanted.push(monitoring_namespace_name(&addon.name_any()));

    for ns in owned.items {
        let name = ns.name_any();
        if wanted.iter().any(|w| *w == name) {
            continue;
        }
        debug!(addon = %addon.name_any(), namespace = %name, "Deleting unwanted namespace");
        ignore_not_found(api.delete(&name, &DeleteParams::default()).await.map(|_| ()))?;
    }

    Ok(PhaseResult::Continue)
}
