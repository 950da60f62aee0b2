//! ObjectSet reconciler: pins a revision number, applies phases in order
//! and aggregates availability, archival and handover state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::cache::DynamicCache;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::phase::DEFAULT_RETRY_AFTER;
use crate::crd::{
    condition_status, is_condition_true, objectset_conditions, remove_condition, set_condition,
    ObjectSet, ObjectSetStatus, CACHE_FINALIZER,
};
use crate::health::HealthState;
use crate::objectset::error::RevisionError;
use crate::objectset::phase::{
    cache_owner_key, reconcile_phase, teardown_phase, PhaseContext, PhaseOutcome,
};
use crate::objectset::previous::{derive_revision, lookup_previous};
use crate::objectset::probes::Prober;
use crate::owners::{impersonated_client, object_set_impersonation};
use crate::resources::FIELD_MANAGER;

/// Resync interval for settled ObjectSets
const FULL_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

pub const CONTROLLER_NAME: &str = "objectset";

mod status_phases {
    pub const PENDING: &str = "Pending";
    pub const AVAILABLE: &str = "Available";
    pub const NOT_READY: &str = "NotReady";
    pub const PAUSED: &str = "Paused";
    pub const ARCHIVED: &str = "Archived";
}

/// Shared state of the revision-engine controllers.
pub struct ObjectSetContext {
    pub client: kube::Client,
    /// When set, phase writes run under an impersonated identity derived
    /// from the managed owner chain root instead of the controller identity.
    pub config: Option<kube::Config>,
    pub cache: Arc<DynamicCache>,
    pub health: Option<Arc<HealthState>>,
}

impl ObjectSetContext {
    /// Client for phase writes on behalf of the given ObjectSet.
    fn phase_client(&self, object_set: &ObjectSet) -> Result<kube::Client> {
        match &self.config {
            Some(config) => {
                let identity = object_set_impersonation(object_set);
                Ok(impersonated_client(config.clone(), &identity)?)
            }
            None => Ok(self.client.clone()),
        }
    }
}

fn has_cache_finalizer(object_set: &ObjectSet) -> bool {
    object_set
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == CACHE_FINALIZER))
}

fn namespace_of(object_set: &ObjectSet) -> Result<String> {
    object_set
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))
}

async fn patch_finalizers(
    ctx: &ObjectSetContext,
    object_set: &ObjectSet,
    finalizers: Vec<String>,
) -> Result<()> {
    let namespace = namespace_of(object_set)?;
    let api: Api<ObjectSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": object_set.metadata.resource_version,
        }
    });
    api.patch(
        &object_set.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

async fn ensure_cache_finalizer(ctx: &ObjectSetContext, object_set: &ObjectSet) -> Result<()> {
    if has_cache_finalizer(object_set) {
        return Ok(());
    }
    let mut finalizers = object_set.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(CACHE_FINALIZER.to_string());
    patch_finalizers(ctx, object_set, finalizers).await?;
    debug!(objectset = %object_set.name_any(), "Added cache finalizer");
    Ok(())
}

async fn handle_deletion(ctx: &ObjectSetContext, object_set: &ObjectSet) -> Result<Action> {
    if !has_cache_finalizer(object_set) {
        return Ok(Action::await_change());
    }

    // Managed objects are garbage collected through owner references; the
    // finalizer only guarantees the dynamic watches are released
    ctx.cache.free(&cache_owner_key(object_set)).await;

    let finalizers: Vec<String> = object_set
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != CACHE_FINALIZER)
        .collect();
    patch_finalizers(ctx, object_set, finalizers).await?;

    info!(objectset = %object_set.name_any(), "Released dynamic watches");
    Ok(Action::await_change())
}

async fn commit_status(
    ctx: &ObjectSetContext,
    object_set: &ObjectSet,
    status: ObjectSetStatus,
) -> Result<()> {
    if object_set.status.as_ref() == Some(&status) {
        return Ok(());
    }
    let namespace = namespace_of(object_set)?;
    let api: Api<ObjectSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut updated = object_set.clone();
    updated.status = Some(status);
    api.replace_status(
        &object_set.name_any(),
        &PostParams::default(),
        serde_json::to_vec(&updated)?,
    )
    .await?;
    Ok(())
}

fn adoption_reason(error: &RevisionError) -> &'static str {
    match error {
        RevisionError::NotOwnedByPreviousRevision { .. } => "ObjectNotOwnedByPreviousRevision",
        RevisionError::RevisionCollision { .. } => "RevisionCollision",
    }
}

async fn reconcile_archival(
    ctx: &ObjectSetContext,
    object_set: &ObjectSet,
    phase_ctx: &PhaseContext<'_>,
    mut status: ObjectSetStatus,
) -> Result<Action> {
    let generation = object_set.metadata.generation;
    let mut all_done = true;

    // Teardown runs in reverse phase order so dependents go first
    for phase in object_set.spec.template.phases.iter().rev() {
        if phase.class.is_some() {
            continue;
        }
        if !teardown_phase(phase_ctx, phase).await? {
            all_done = false;
        }
    }

    set_condition(
        &mut status.conditions,
        generation,
        objectset_conditions::AVAILABLE,
        condition_status::FALSE,
        "Archived",
        "ObjectSet is being archived.",
    );

    if all_done {
        ctx.cache.free(&cache_owner_key(object_set)).await;
        status.controller_of.clear();
        set_condition(
            &mut status.conditions,
            generation,
            objectset_conditions::ARCHIVED,
            condition_status::TRUE,
            "Archived",
            "All managed objects are torn down or handed over.",
        );
        status.phase = Some(status_phases::ARCHIVED.to_string());
        commit_status(ctx, object_set, status).await?;
        return Ok(Action::await_change());
    }

    set_condition(
        &mut status.conditions,
        generation,
        objectset_conditions::ARCHIVED,
        condition_status::FALSE,
        "ArchivalInProgress",
        "Some managed objects still exist.",
    );
    status.phase = Some(status_phases::ARCHIVED.to_string());
    commit_status(ctx, object_set, status).await?;
    Ok(Action::requeue(DEFAULT_RETRY_AFTER))
}

async fn reconcile_inner(object_set: &ObjectSet, ctx: &ObjectSetContext) -> Result<Action> {
    let namespace = namespace_of(object_set)?;
    let generation = object_set.metadata.generation;

    if object_set.metadata.deletion_timestamp.is_some() {
        return handle_deletion(ctx, object_set).await;
    }
    ensure_cache_finalizer(ctx, object_set).await?;

    let owner_uid = object_set
        .metadata
        .uid
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;

    let previous = lookup_previous(&ctx.client, &namespace, object_set).await?;
    let revision = derive_revision(object_set, &previous);

    let mut status = object_set.status.clone().unwrap_or_default();
    status.observed_generation = generation;
    status.revision = Some(revision);

    let prober = Prober::new(object_set.spec.template.availability_probes.clone());
    let phase_client = ctx.phase_client(object_set)?;
    let phase_ctx = PhaseContext {
        client: &phase_client,
        cache: &ctx.cache,
        owner: object_set,
        owner_uid: &owner_uid,
        revision,
        previous_uids: &previous.uids,
        prober: &prober,
    };

    if object_set.is_archived() {
        remove_condition(&mut status.conditions, objectset_conditions::PAUSED);
        return reconcile_archival(ctx, object_set, &phase_ctx, status).await;
    }

    if object_set.is_paused() {
        set_condition(
            &mut status.conditions,
            generation,
            objectset_conditions::PAUSED,
            condition_status::TRUE,
            "Paused",
            "Objects are observed but not reconciled.",
        );
    } else {
        remove_condition(&mut status.conditions, objectset_conditions::PAUSED);
    }

    let mut controller_of = Vec::new();
    let mut failure: Option<(String, String)> = None;

    for phase in &object_set.spec.template.phases {
        if phase.class.is_some() {
            // Delegated phases are reconciled by an external phase
            // controller and tracked through remotePhases
            debug!(objectset = %object_set.name_any(), phase = %phase.name, "Skipping delegated phase");
            continue;
        }

        match reconcile_phase(&phase_ctx, phase).await? {
            PhaseOutcome::Ready(mut controlled) => controller_of.append(&mut controlled),
            PhaseOutcome::ProbeFailure(probing) => {
                failure = Some(("ProbeFailure".to_string(), probing.to_string()));
                break;
            }
            PhaseOutcome::AdoptionRefused(refused) => {
                failure = Some((adoption_reason(&refused).to_string(), refused.to_string()));
                break;
            }
        }
    }

    status.controller_of = controller_of;

    let action = match failure {
        Some((reason, message)) => {
            set_condition(
                &mut status.conditions,
                generation,
                objectset_conditions::AVAILABLE,
                condition_status::FALSE,
                &reason,
                &message,
            );
            status.phase = Some(status_phases::NOT_READY.to_string());
            Action::requeue(DEFAULT_RETRY_AFTER)
        }
        None => {
            set_condition(
                &mut status.conditions,
                generation,
                objectset_conditions::AVAILABLE,
                condition_status::TRUE,
                "Available",
                "All objects are applied and pass their probes.",
            );
            // Latched forever after the first availability
            if !is_condition_true(&status.conditions, objectset_conditions::SUCCEEDED) {
                set_condition(
                    &mut status.conditions,
                    generation,
                    objectset_conditions::SUCCEEDED,
                    condition_status::TRUE,
                    "AvailableOnce",
                    "ObjectSet was available at least once.",
                );
            }
            status.phase = Some(if object_set.is_paused() {
                status_phases::PAUSED.to_string()
            } else {
                status_phases::AVAILABLE.to_string()
            });
            Action::requeue(FULL_RESYNC_INTERVAL)
        }
    };

    if status.phase.is_none() {
        status.phase = Some(status_phases::PENDING.to_string());
    }
    commit_status(ctx, object_set, status).await?;
    Ok(action)
}

pub async fn reconcile(object_set: Arc<ObjectSet>, ctx: Arc<ObjectSetContext>) -> Result<Action> {
    let start = Instant::now();
    let name = object_set.name_any();
    debug!(objectset = %name, "Reconciling ObjectSet");

    let result = reconcile_inner(&object_set, &ctx).await;

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

pub fn error_policy(object_set: Arc<ObjectSet>, error: &Error, ctx: Arc<ObjectSetContext>) -> Action {
    warn!(objectset = %object_set.name_any(), error = %error, "ObjectSet reconciliation failed");

    if let Some(health) = &ctx.health {
        health
            .metrics
            .record_error(CONTROLLER_NAME, &object_set.name_any());
    }

    Action::requeue(BackoffConfig::default().delay_for_error(error, 0))
}
