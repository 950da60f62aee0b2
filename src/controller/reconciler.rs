//! Addon reconciler: drives one Addon through the ordered phase pipeline
//! and commits the status subresource exactly once per invocation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::phase::{PhaseResult, DEFAULT_RETRY_AFTER};
use crate::controller::phase_addon_instance::ensure_addon_instance;
use crate::controller::phase_monitoring::{
    delete_unwanted_monitoring_federation, ensure_monitoring_federation,
};
use crate::controller::phase_namespaces::{delete_unwanted_namespaces, ensure_wanted_namespaces};
use crate::controller::phase_olm::{
    ensure_catalog_source, ensure_operator_group, ensure_subscription, observe_current_csv,
};
use crate::controller::status::{commit_status, reasons, StatusReporter};
use crate::controller::upgrade_policy::report_upgrade_policy;
use crate::controller::Context;
use crate::crd::Addon;
use crate::resources::common::{CACHE_FINALIZER, FIELD_MANAGER};

/// Resync interval for fully reconciled addons
const FULL_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

pub const CONTROLLER_NAME: &str = "addon";

fn has_cache_finalizer(addon: &Addon) -> bool {
    addon
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == CACHE_FINALIZER))
}

/// Add the cache finalizer before any downstream resource is created, so
/// the deletion flow is guaranteed to run.
async fn ensure_cache_finalizer(ctx: &Context, addon: &Addon) -> Result<()> {
    if has_cache_finalizer(addon) {
        return Ok(());
    }

    let api: Api<Addon> = Api::all(ctx.client.clone());
    let mut finalizers = addon.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(CACHE_FINALIZER.to_string());

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": addon.metadata.resource_version,
        }
    });
    api.patch(
        &addon.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    info!(addon = %addon.name_any(), "Added cache finalizer");
    Ok(())
}

/// Deletion flow: stamp Terminating, release CSV mappings, drop the
/// finalizer. Owned resources are garbage collected via owner references.
async fn handle_deletion(ctx: &Context, addon: &Addon, mut reporter: StatusReporter) -> Result<Action> {
    let name = addon.name_any();

    if !has_cache_finalizer(addon) {
        return Ok(Action::await_change());
    }

    reporter.report_terminating();
    commit_status(ctx, addon, reporter.into_status()).await?;

    ctx.runtime.csv_events.free(&name);

    let finalizers: Vec<String> = addon
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != CACHE_FINALIZER)
        .collect();

    let api: Api<Addon> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": addon.metadata.resource_version,
        }
    });
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;

    info!(addon = %name, "Removed cache finalizer");
    Ok(Action::await_change())
}

/// Run the ordered phase pipeline. A `Retry` or `Stop` from any step
/// short-circuits the rest.
async fn run_pipeline(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<PhaseResult> {
    let result = ensure_wanted_namespaces(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let result = delete_unwanted_namespaces(ctx, addon).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let result = ensure_addon_instance(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let result = ensure_operator_group(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let result = ensure_catalog_source(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let (result, csv_key) = ensure_subscription(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let Some(csv_key) = csv_key else {
        // Unreachable when the subscription phase continued, but never
        // trust the CSV linkage blindly
        reporter.report_pending_subscription();
        return Ok(PhaseResult::Retry);
    };

    let result = observe_current_csv(ctx, reporter, &csv_key).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    let result = ensure_monitoring_federation(ctx, addon, reporter).await?;
    if result.short_circuits() {
        return Ok(result);
    }

    delete_unwanted_monitoring_federation(ctx, addon).await
}

async fn reconcile_inner(addon: &Addon, ctx: &Context) -> Result<Action> {
    let mut reporter = StatusReporter::new(addon);

    // Held for the whole pipeline execution
    let pause = ctx.runtime.pause_guard().await;
    if *pause {
        reporter.report_paused(
            reasons::ADDON_OPERATOR_PAUSED,
            "Reconciliation paused for the whole cluster.",
        );
        commit_status(ctx, addon, reporter.into_status()).await?;
        return Ok(Action::await_change());
    }

    if addon.spec.paused {
        reporter.report_paused(reasons::ADDON_PAUSED, "Reconciliation paused for this addon.");
        commit_status(ctx, addon, reporter.into_status()).await?;
        return Ok(Action::await_change());
    }

    reporter.clear_paused();

    if addon.metadata.deletion_timestamp.is_some() {
        return handle_deletion(ctx, addon, reporter).await;
    }

    ensure_cache_finalizer(ctx, addon).await?;

    // A failing phase must still publish the conditions stamped so far
    let outcome = match run_pipeline(ctx, addon, &mut reporter).await {
        Ok(outcome) => outcome,
        Err(error) => {
            if let Err(commit_error) = commit_status(ctx, addon, reporter.into_status()).await {
                warn!(
                    addon = %addon.name_any(),
                    error = %commit_error,
                    "Failed to commit status after phase error",
                );
            }
            return Err(error);
        }
    };

    let mut deferred: Result<()> = Ok(());
    if outcome == PhaseResult::Continue {
        reporter.report_available();
        deferred = report_upgrade_policy(ctx, addon, &mut reporter).await;
    }

    // Single deferred status write, also on reporter failure
    commit_status(ctx, addon, reporter.into_status()).await?;
    deferred?;

    match outcome {
        PhaseResult::Continue => Ok(Action::requeue(FULL_RESYNC_INTERVAL)),
        PhaseResult::Retry => Ok(Action::requeue(DEFAULT_RETRY_AFTER)),
        PhaseResult::Stop => Ok(Action::await_change()),
    }
}

/// Main reconcile entrypoint wired into the controller.
pub async fn reconcile(addon: Arc<Addon>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = addon.name_any();
    debug!(addon = %name, "Reconciling addon");

    let result = reconcile_inner(&addon, &ctx).await;

    if let Some(health) = &ctx.health {
        match &result {
            Ok(_) => health
                .metrics
                .record_reconcile(CONTROLLER_NAME, &name, start.elapsed().as_secs_f64()),
            Err(_) => health.metrics.record_error(CONTROLLER_NAME, &name),
        }
    }

    result
}

/// Requeue with exponential backoff on reconcile errors.
pub fn error_policy(addon: Arc<Addon>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(addon = %addon.name_any(), error = %error, "Addon reconciliation failed");

    if let Some(health) = &ctx.health {
        health
            .metrics
            .record_error(CONTROLLER_NAME, &addon.name_any());
    }

    Action::requeue(BackoffConfig::default().delay_for_error(error, 0))
}
