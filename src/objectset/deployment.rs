//! ObjectDeployment reconciler: rolls the template out as ObjectSet
//! revisions, archives superseded revisions and prunes history.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::api::{Api, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::controller::error::{ignore_not_found, BackoffConfig, Error, Result};
use crate::controller::phase::DEFAULT_RETRY_AFTER;
use crate::crd::{
    condition_status, is_condition_true, objectset_conditions, set_condition, ObjectDeployment,
    ObjectDeploymentStatus, ObjectSet, ObjectSetLifecycleState, ObjectSetSpec,
    PreviousRevisionReference, DEFAULT_REVISION_HISTORY_LIMIT, HASH_ANNOTATION,
};
use crate::objectset::hash::compute_hash;
use crate::objectset::reconciler::ObjectSetContext;
use crate::resources::FIELD_MANAGER;

const FULL_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

pub const CONTROLLER_NAME: &str = "objectdeployment";

fn namespace_of(deployment: &ObjectDeployment) -> Result<String> {
    deployment
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))
}

fn deployment_owner_reference(
    deployment: &ObjectDeployment,
) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: ObjectDeployment::api_version(&()).to_string(),
        kind: ObjectDeployment::kind(&()).to_string(),
        name: deployment.name_any(),
        uid: deployment.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn selector_labels(deployment: &ObjectDeployment) -> String {
    deployment
        .spec
        .selector
        .match_labels
        .as_ref()
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

fn template_hash_of(object_set: &ObjectSet) -> Option<&str> {
    object_set
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(HASH_ANNOTATION))
        .map(String::as_str)
}

/// Owned ObjectSets sorted by ascending revision.
async fn list_revisions(
    ctx: &ObjectSetContext,
    deployment: &ObjectDeployment,
) -> Result<Vec<ObjectSet>> {
    let namespace = namespace_of(deployment)?;
    let api: Api<ObjectSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let params = ListParams::default().labels(&selector_labels(deployment));
    let deployment_uid = deployment.metadata.uid.as_deref().unwrap_or_default();

    let mut revisions: Vec<ObjectSet> = api
        .list(&params)
        .await?
        .items
        .into_iter()
        .filter(|os| crate::owners::is_controlled_by(&os.metadata, deployment_uid))
        .collect();
    revisions.sort_by_key(ObjectSet::revision);
    Ok(revisions)
}

fn new_revision(
    deployment: &ObjectDeployment,
    hash: &str,
    live_revisions: &[&ObjectSet],
) -> ObjectSet {
    let mut labels = deployment.spec.template.metadata.labels.clone();
    if let Some(selector) = &deployment.spec.selector.match_labels {
        labels.extend(selector.clone());
    }
    let mut annotations = deployment.spec.template.metadata.annotations.clone();
    annotations.insert(HASH_ANNOTATION.to_string(), hash.to_string());

    ObjectSet {
        metadata: ObjectMeta {
            name: Some(format!("{}-{}", deployment.name_any(), hash)),
            namespace: deployment.namespace(),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: Some(vec![deployment_owner_reference(deployment)]),
            ..Default::default()
        },
        spec: ObjectSetSpec {
            lifecycle_state: ObjectSetLifecycleState::Active,
            previous: live_revisions
                .iter()
                .map(|os| PreviousRevisionReference { name: os.name_any() })
                .collect(),
            template: deployment.spec.template.spec.clone(),
        },
        status: None,
    }
}

async fn set_lifecycle_state(
    ctx: &ObjectSetContext,
    object_set: &ObjectSet,
    state: ObjectSetLifecycleState,
) -> Result<()> {
    let namespace = object_set
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let api: Api<ObjectSet> = Api::namespaced(ctx.client.clone(), &namespace);
    let patch = serde_json::json!({"spec": {"lifecycleState": state}});
    api.patch(
        &object_set.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Objects a revision actively reconciles, for archival safety checks.
fn controlled_objects(object_set: &ObjectSet) -> HashSet<(String, String, String)> {
    object_set
        .status
        .as_ref()
        .map(|s| {
            s.controller_of
                .iter()
                .map(|r| {
                    (
                        format!("{}/{}", r.group, r.kind),
                        r.namespace.clone().unwrap_or_default(),
                        r.name.clone(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `older` may be archived without tearing down the only working
/// copy of an object.
fn safe_to_archive(older: &ObjectSet, newer: &[&ObjectSet]) -> bool {
    if newer.iter().any(|os| os.is_available()) {
        return true;
    }
    let still_wanted: HashSet<_> = newer
        .iter()
        .flat_map(|os| controlled_objects(os))
        .collect();
    controlled_objects(older)
        .intersection(&still_wanted)
        .next()
        .is_none()
}

/// Pause, confirm, then archive superseded revisions.
async fn archive_superseded(
    ctx: &ObjectSetContext,
    revisions: &[ObjectSet],
    latest_revision: i64,
) -> Result<()> {
    for (index, older) in revisions.iter().enumerate() {
        if older.revision() >= latest_revision || older.is_archived() {
            continue;
        }
        let newer: Vec<&ObjectSet> = revisions[index + 1..]
            .iter()
            .filter(|os| !os.is_archived())
            .collect();
        if !safe_to_archive(older, &newer) {
            continue;
        }

        if !older.is_paused() {
            set_lifecycle_state(ctx, older, ObjectSetLifecycleState::Paused).await?;
            continue;
        }
        // Archive only after the revision confirmed the pause, so no write
        // races the teardown
        let paused_confirmed = older.status.as_ref().is_some_and(|s| {
            is_condition_true(&s.conditions, objectset_conditions::PAUSED)
        });
        if paused_confirmed {
            set_lifecycle_state(ctx, older, ObjectSetLifecycleState::Archived).await?;
            info!(objectset = %older.name_any(), "Archived superseded revision");
        }
    }
    Ok(())
}

/// Delete the oldest archived revisions beyond the history limit.
async fn prune_history(
    ctx: &ObjectSetContext,
    deployment: &ObjectDeployment,
    revisions: &[ObjectSet],
) -> Result<()> {
    let limit = deployment
        .spec
        .revision_history_limit
        .map(|l| l.max(0) as usize)
        .unwrap_or(DEFAULT_REVISION_HISTORY_LIMIT);

    let archived: Vec<&ObjectSet> = revisions.iter().filter(|os| os.is_archived()).collect();
    if archived.len() <= limit {
        return Ok(());
    }

    let namespace = namespace_of(deployment)?;
    let api: Api<ObjectSet> = Api::namespaced(ctx.client.clone(), &namespace);
    for stale in &archived[..archived.len() - limit] {
        ignore_not_found(
            api.delete(&stale.name_any(), &Default::default())
                .await
                .map(|_| ()),
        )?;
        debug!(objectset = %stale.name_any(), "Pruned archived revision");
    }
    Ok(())
}

async fn commit_status(
    ctx: &ObjectSetContext,
    deployment: &ObjectDeployment,
    status: ObjectDeploymentStatus,
) -> Result<()> {
    if deployment.status.as_ref() == Some(&status) {
        return Ok(());
    }
    let namespace = namespace_of(deployment)?;
    let api: Api<ObjectDeployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut updated = deployment.clone();
    updated.status = Some(status);
    api.replace_status(
        &deployment.name_any(),
        &PostParams::default(),
        serde_json::to_vec(&updated)?,
    )
    .await?;
    Ok(())
}

async fn reconcile_inner(deployment: &ObjectDeployment, ctx: &ObjectSetContext) -> Result<Action> {
    let namespace = namespace_of(deployment)?;
    let generation = deployment.metadata.generation;

    let mut status = deployment.status.clone().unwrap_or_default();
    status.observed_generation = generation;

    let hash = compute_hash(&deployment.spec.template, status.collision_count);
    let revisions = list_revisions(ctx, deployment).await?;

    let current = revisions
        .iter()
        .find(|os| template_hash_of(os) == Some(hash.as_str()));

    if current.is_none() {
        let desired_name = format!("{}-{}", deployment.name_any(), hash);
        let api: Api<ObjectSet> = Api::namespaced(ctx.client.clone(), &namespace);

        if let Some(existing) = api.get_opt(&desired_name).await? {
            if existing.spec.template != deployment.spec.template.spec {
                // Distinct template hashed onto an occupied name; bump the
                // count so the next pass produces a fresh name
                status.collision_count = Some(status.collision_count.unwrap_or(0) + 1);
                warn!(
                    objectdeployment = %deployment.name_any(),
                    collision_count = status.collision_count,
                    "Template hash collision",
                );
                commit_status(ctx, deployment, status).await?;
                return Ok(Action::requeue(Duration::from_secs(1)));
            }
        } else {
            let live: Vec<&ObjectSet> = revisions.iter().filter(|os| !os.is_archived()).collect();
            let new = new_revision(deployment, &hash, &live);
            api.create(&PostParams::default(), &new).await?;
            info!(
                objectdeployment = %deployment.name_any(),
                objectset = %desired_name,
                "Created new revision",
            );
            status.template_hash = Some(hash);
            commit_status(ctx, deployment, status).await?;
            return Ok(Action::requeue(DEFAULT_RETRY_AFTER));
        }
    }

    status.template_hash = Some(hash.clone());

    let latest = revisions.iter().max_by_key(|os| os.revision());
    let latest_available = latest.is_some_and(|os| os.is_available());
    let any_available = revisions.iter().any(|os| os.is_available());

    if let Some(latest) = latest {
        archive_superseded(ctx, &revisions, latest.revision()).await?;
    }
    prune_history(ctx, deployment, &revisions).await?;

    set_condition(
        &mut status.conditions,
        generation,
        objectset_conditions::AVAILABLE,
        if any_available {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        },
        if any_available { "Available" } else { "ObjectSetUnready" },
        if any_available {
            "At least one revision is available."
        } else {
            "No revision is available."
        },
    );
    set_condition(
        &mut status.conditions,
        generation,
        objectset_conditions::PROGRESSING,
        if latest_available {
            condition_status::FALSE
        } else {
            condition_status::TRUE
        },
        if latest_available { "Idle" } else { "Progressing" },
        if latest_available {
            "The newest revision is available."
        } else {
            "Waiting for the newest revision to become available."
        },
    );

    commit_status(ctx, deployment, status).await?;

    if latest_available {
        Ok(Action::requeue(FULL_RESYNC_INTERVAL))
    } else {
        Ok(Action::requeue(DEFAULT_RETRY_AFTER))
    }
}

pub async fn reconcile(
    deployment: Arc<ObjectDeployment>,
    ctx: Arc<ObjectSetContext>,
) -> Result<Action> {
    let start = Instant::now();
    let name = deployment.name_any();
    debug!(objectdeployment = %name, "Reconciling ObjectDeployment");

    let result = reconcile_inner(&deployment, &ctx).await;

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

pub fn error_policy(
    deployment: Arc<ObjectDeployment>,
    error: &Error,
    ctx: Arc<ObjectSetContext>,
) -> Action {
    warn!(objectdeployment = %deployment.name_any(), error = %error, "ObjectDeployment reconciliation failed");

    if let Some(health) = &ctx.health {
        health
            .metrics
            .record_error(CONTROLLER_NAME, &deployment.name_any());
    }

    Action::requeue(BackoffConfig::default().delay_for_error(error, 0))
}
