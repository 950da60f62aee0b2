//! Phase apply and teardown for one ObjectSet revision.
//!
//! Objects are handled as dynamic manifests: defaulted into the owner's
//! namespace, stamped with the revision annotation and cache label, and
//! controller-owned by the revision that reconciles them.

use std::collections::{BTreeMap, HashSet};

use kube::api::{
    Api, ApiResource, DynamicObject, GroupVersionKind, ObjectMeta, Patch, PatchParams, PostParams,
};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::DynamicCache;
use crate::controller::error::{ignore_not_found, Error, Result};
use crate::crd::{
    ControlledObjectReference, ObjectSet, ObjectSetTemplatePhase, CACHE_LABEL, REVISION_ANNOTATION,
};
use crate::objectset::adoption::{check_adoption, AdoptionDecision};
use crate::objectset::error::{PhaseProbingFailed, RevisionError};
use crate::objectset::probes::Prober;
use crate::owners::{is_controlled_by, object_set_owner_reference, remove_owner, set_controller};
use crate::resources::FIELD_MANAGER;

/// Everything needed to reconcile the phases of one revision.
pub struct PhaseContext<'a> {
    pub client: &'a Client,
    pub cache: &'a DynamicCache,
    pub owner: &'a ObjectSet,
    pub owner_uid: &'a str,
    pub revision: i64,
    pub previous_uids: &'a HashSet<String>,
    pub prober: &'a Prober,
}

/// Outcome of reconciling one phase.
#[derive(Debug)]
pub enum PhaseOutcome {
    /// All objects applied and probed successfully
    Ready(Vec<ControlledObjectReference>),
    /// One or more probes failed; later phases must not run
    ProbeFailure(PhaseProbingFailed),
    /// An object refused adoption; later phases must not run
    AdoptionRefused(RevisionError),
}

/// Cache registration key for an ObjectSet, also used to free its watches.
pub fn cache_owner_key(object_set: &ObjectSet) -> String {
    format!(
        "ObjectSet/{}/{}",
        object_set.namespace().unwrap_or_default(),
        object_set.name_any()
    )
}

fn gvk_of(manifest: &Value) -> Result<GroupVersionKind> {
    let api_version = manifest
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or(Error::MissingObjectKey(".apiVersion"))?;
    let kind = manifest
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(Error::MissingObjectKey(".kind"))?;

    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    Ok(GroupVersionKind::gvk(group, version, kind))
}

fn controlled_reference(gvk: &GroupVersionKind, obj: &DynamicObject) -> ControlledObjectReference {
    ControlledObjectReference {
        group: gvk.group.clone(),
        kind: gvk.kind.clone(),
        name: obj.name_any(),
        namespace: obj.namespace(),
    }
}

/// Build the desired form of one declared object.
fn desired_object(ctx: &PhaseContext<'_>, manifest: &Value) -> Result<DynamicObject> {
    let mut desired: DynamicObject = serde_json::from_value(manifest.clone())?;

    if desired.metadata.name.is_none() {
        return Err(Error::MissingObjectKey(".metadata.name"));
    }
    if desired.metadata.namespace.is_none() {
        desired.metadata.namespace = ctx.owner.namespace();
    }

    let labels = desired.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(CACHE_LABEL.to_string(), "True".to_string());

    let annotations = desired
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new);
    annotations.insert(REVISION_ANNOTATION.to_string(), ctx.revision.to_string());

    set_controller(&mut desired.metadata, object_set_owner_reference(ctx.owner));

    Ok(desired)
}

/// Whether `desired` is fully contained in `current`. `Null` in the desired
/// form matches anything, so cleared fields never force a patch.
pub fn is_deep_derivative(desired: &Value, current: &Value) -> bool {
    match desired {
        Value::Null => true,
        Value::Object(fields) => match current.as_object() {
            Some(current_fields) => fields.iter().all(|(key, value)| {
                is_deep_derivative(value, current_fields.get(key).unwrap_or(&Value::Null))
            }),
            None => false,
        },
        Value::Array(items) => match current.as_array() {
            Some(current_items) if current_items.len() == items.len() => items
                .iter()
                .zip(current_items)
                .all(|(desired, current)| is_deep_derivative(desired, current)),
            _ => false,
        },
        scalar => scalar == current,
    }
}

fn merged_metadata(desired: &ObjectMeta, current: &ObjectMeta) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut labels = current.labels.clone().unwrap_or_default();
    labels.extend(desired.labels.clone().unwrap_or_default());
    let mut annotations = current.annotations.clone().unwrap_or_default();
    annotations.extend(desired.annotations.clone().unwrap_or_default());
    (labels, annotations)
}

fn dynamic_api(client: &Client, gvk: &GroupVersionKind, namespace: Option<&str>) -> Api<DynamicObject> {
    let resource = ApiResource::from_gvk(gvk);
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &resource),
        None => Api::all_with(client.clone(), &resource),
    }
}

async fn patch_metadata(
    api: &Api<DynamicObject>,
    name: &str,
    current: &DynamicObject,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
    owner_references: &ObjectMeta,
) -> Result<DynamicObject> {
    let owner_refs = serde_json::to_value(&owner_references.owner_references)?;
    let patch = serde_json::json!({
        "metadata": {
            "labels": labels,
            "annotations": annotations,
            "ownerReferences": owner_refs,
            "resourceVersion": current.metadata.resource_version,
        }
    });
    Ok(api
        .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?)
}

/// Apply one declared object, returning the live object for probing or a
/// refused adoption.
async fn reconcile_object(
    ctx: &PhaseContext<'_>,
    owner_key: &str,
    manifest: &Value,
) -> Result<std::result::Result<(GroupVersionKind, DynamicObject), RevisionError>> {
    let gvk = gvk_of(manifest)?;
    ctx.cache.watch(owner_key, &gvk).await?;

    let desired = desired_object(ctx, manifest)?;
    let namespace = desired.metadata.namespace.clone().unwrap_or_default();
    let name = desired.name_any();

    let current = ctx.cache.get(&gvk, &namespace, &name).await?;

    if ctx.owner.is_paused() {
        // Observation only; a missing object simply is not probed
        return Ok(Ok((
            gvk,
            current.unwrap_or_else(|| desired.clone()),
        )));
    }

    let ns_for_api = if namespace.is_empty() { None } else { Some(namespace.as_str()) };
    let api = dynamic_api(ctx.client, &gvk, ns_for_api);

    let Some(current) = current else {
        let created = api.create(&PostParams::default(), &desired).await?;
        debug!(kind = %gvk.kind, object = %name, "Created managed object");
        return Ok(Ok((gvk, created)));
    };

    let mut live = current;
    match check_adoption(ctx.owner_uid, ctx.revision, &live.metadata, ctx.previous_uids) {
        Ok(AdoptionDecision::Adopt) => {
            let mut target_meta = live.metadata.clone();
            set_controller(&mut target_meta, object_set_owner_reference(ctx.owner));
            let (labels, annotations) = merged_metadata(&desired.metadata, &live.metadata);
            live = patch_metadata(&api, &name, &live, &labels, &annotations, &target_meta).await?;
            info!(kind = %gvk.kind, object = %name, revision = ctx.revision, "Adopted object");
        }
        Ok(AdoptionDecision::AlreadySettled) => {}
        Err(refused) => return Ok(Err(refused)),
    }

    if is_controlled_by(&live.metadata, ctx.owner_uid) {
        let (labels, annotations) = merged_metadata(&desired.metadata, &live.metadata);
        let metadata_changed = live.metadata.labels.as_ref() != Some(&labels)
            || live.metadata.annotations.as_ref() != Some(&annotations);
        if metadata_changed {
            live = patch_metadata(&api, &name, &live, &labels, &annotations, &live.metadata.clone())
                .await?;
        }

        let mut desired_fields = serde_json::to_value(&desired.data)?;
        if let Some(fields) = desired_fields.as_object_mut() {
            fields.remove("status");
        }
        let current_fields = serde_json::to_value(&live.data)?;
        if !is_deep_derivative(&desired_fields, &current_fields) {
            live = api
                .patch(
                    &name,
                    &PatchParams::apply(FIELD_MANAGER),
                    &Patch::Merge(&desired_fields),
                )
                .await?;
            debug!(kind = %gvk.kind, object = %name, "Patched drifted object");
        }
    }

    Ok(Ok((gvk, live)))
}

/// Reconcile every object of a phase, collecting probe failures.
pub async fn reconcile_phase(
    ctx: &PhaseContext<'_>,
    phase: &ObjectSetTemplatePhase,
) -> Result<PhaseOutcome> {
    let owner_key = cache_owner_key(ctx.owner);
    let mut controlled = Vec::new();
    let mut failures = Vec::new();

    for declared in &phase.objects {
        let (gvk, live) = match reconcile_object(ctx, &owner_key, &declared.object).await? {
            Ok(live) => live,
            Err(refused) => return Ok(PhaseOutcome::AdoptionRefused(refused)),
        };

        if is_controlled_by(&live.metadata, ctx.owner_uid) {
            controlled.push(controlled_reference(&gvk, &live));
        }

        let live_value = serde_json::to_value(&live)?;
        if let Err(failure) = ctx.prober.probe(&live_value) {
            failures.push(format!("{}: {}", live.name_any(), failure));
        }
    }

    if failures.is_empty() {
        Ok(PhaseOutcome::Ready(controlled))
    } else {
        Ok(PhaseOutcome::ProbeFailure(PhaseProbingFailed {
            phase: phase.name.clone(),
            failures,
        }))
    }
}

/// Tear down one phase. Returns whether every object of the phase is gone or
/// released.
pub async fn teardown_phase(
    ctx: &PhaseContext<'_>,
    phase: &ObjectSetTemplatePhase,
) -> Result<bool> {
    let owner_key = cache_owner_key(ctx.owner);
    let mut done = true;

    for declared in &phase.objects {
        let gvk = gvk_of(&declared.object)?;
        ctx.cache.watch(&owner_key, &gvk).await?;

        let desired = desired_object(ctx, &declared.object)?;
        let namespace = desired.metadata.namespace.clone().unwrap_or_default();
        let name = desired.name_any();

        let Some(current) = ctx.cache.get(&gvk, &namespace, &name).await? else {
            continue;
        };

        let ns_for_api = if namespace.is_empty() { None } else { Some(namespace.as_str()) };
        let api = dynamic_api(ctx.client, &gvk, ns_for_api);

        if !is_controlled_by(&current.metadata, ctx.owner_uid) {
            // Another revision took over; just release our reference
            let mut meta = current.metadata.clone();
            remove_owner(&mut meta, ctx.owner_uid);
            let owner_refs = serde_json::to_value(&meta.owner_references)?;
            let patch = serde_json::json!({
                "metadata": {
                    "ownerReferences": owner_refs,
                    "resourceVersion": current.metadata.resource_version,
                }
            });
            api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await?;
            continue;
        }

        match ignore_not_found(api.delete(&name, &Default::default()).await.map(|_| ())) {
            Ok(Some(())) => {
                debug!(kind = %gvk.kind, object = %name, "Deleted managed object");
                done = false;
            }
            Ok(None) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(done)
}
