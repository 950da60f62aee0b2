//! Upgrade-policy reporter: tells OCM when an addon upgrade starts and when
//! the addon first turns healthy afterwards.

use std::time::Instant;

use kube::ResourceExt;
use tracing::debug;

use crate::controller::error::Result;
use crate::controller::status::{condition_types, StatusReporter};
use crate::controller::Context;
use crate::crd::{
    is_condition_true, Addon, AddonUpgradePolicyStatus, AddonUpgradePolicyValue,
};
use crate::ocm::UpgradePolicyPatchRequest;

/// Report upgrade progress for the addon, invoked after all phases succeed.
///
/// Errors propagate so the queue retries with exponential backoff.
pub async fn report_upgrade_policy(
    ctx: &Context,
    addon: &Addon,
    reporter: &mut StatusReporter,
) -> Result<()> {
    let Some(policy) = addon.spec.upgrade_policy.as_ref() else {
        return Ok(());
    };

    let observed = reporter.status().upgrade_policy.clone();
    if let Some(observed) = &observed {
        if observed.id == policy.id && observed.value == AddonUpgradePolicyValue::Completed {
            return Ok(());
        }
    }

    let Some(ocm) = ctx.runtime.ocm_client().await else {
        // All addons are re-enqueued once a client is injected
        debug!(addon = %addon.name_any(), "No OCM client injected, skipping upgrade policy report");
        return Ok(());
    };

    let (value, description) = match &observed {
        Some(status) if status.id == policy.id => {
            if !is_condition_true(&reporter.status().conditions, condition_types::AVAILABLE) {
                return Ok(());
            }
            (
                AddonUpgradePolicyValue::Completed,
                "Addon was healthy at least once.",
            )
        }
        _ => (AddonUpgradePolicyValue::Started, "Upgrading addon."),
    };

    let started = Instant::now();
    let result = ocm
        .patch_upgrade_policy(UpgradePolicyPatchRequest {
            id: policy.id.clone(),
            value,
            description: description.to_string(),
        })
        .await;

    if let Some(health) = &ctx.health {
        health
            .metrics
            .observe_ocm_request(started.elapsed().as_secs_f64());
    }

    result?;

    reporter.status_mut().upgrade_policy = Some(AddonUpgradePolicyStatus {
        id: policy.id.clone(),
        value,
        observed_generation: addon.metadata.generation,
    });

    Ok(())
}
