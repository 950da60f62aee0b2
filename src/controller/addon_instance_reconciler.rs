//! AddonInstance heartbeat watchdog: flags instances whose workload stopped
//! reporting heartbeats within the configured period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::Context;
use crate::crd::{condition_status, set_condition, AddonInstance, AddonInstanceStatus};

/// Condition stamped when the workload heartbeat goes stale
pub const HEALTHY_CONDITION: &str = "addons.managed.openshift.io/Healthy";

const HEARTBEAT_TIMEOUT_REASON: &str = "HeartbeatTimeout";

/// A heartbeat counts as stale after this many missed periods
const MISSED_PERIODS_THRESHOLD: i64 = 3;

pub const CONTROLLER_NAME: &str = "addon-instance";

fn heartbeat_period(instance: &AddonInstance) -> Duration {
    let seconds = instance.spec.heartbeat_update_period_seconds.max(1);
    Duration::from_secs(seconds as u64)
}

fn heartbeat_is_stale(instance: &AddonInstance, now: DateTime<Utc>) -> bool {
    let Some(last) = instance
        .status
        .as_ref()
        .and_then(|s| s.last_heartbeat_time.as_deref())
    else {
        // Never reported: leave the instance alone until the workload
        // writes its first heartbeat
        return false;
    };

    let Ok(last) = DateTime::parse_from_rfc3339(last) else {
        return true;
    };

    let threshold = instance.spec.heartbeat_update_period_seconds.max(1) * MISSED_PERIODS_THRESHOLD;
    (now - last.with_timezone(&Utc)).num_seconds() >= threshold
}

async fn commit_status(
    ctx: &Context,
    instance: &AddonInstance,
    status: AddonInstanceStatus,
) -> Result<()> {
    if instance.status.as_ref() == Some(&status) {
        return Ok(());
    }

    let namespace = instance
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let api: Api<AddonInstance> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut updated = instance.clone();
    updated.status = Some(status);
    api.replace_status(
        &instance.name_any(),
        &PostParams::default(),
        serde_json::to_vec(&updated)?,
    )
    .await?;
    Ok(())
}

pub async fn reconcile(instance: Arc<AddonInstance>, ctx: Arc<Context>) -> Result<Action> {
    let mut status = instance.status.clone().unwrap_or_default();
    status.observed_generation = instance.metadata.generation;

    if heartbeat_is_stale(&instance, Utc::now()) {
        info!(
            namespace = instance.namespace().unwrap_or_default(),
            name = %instance.name_any(),
            "Addon heartbeat is overdue",
        );
        set_condition(
            &mut status.conditions,
            instance.metadata.generation,
            HEALTHY_CONDITION,
            condition_status::UNKNOWN,
            HEARTBEAT_TIMEOUT_REASON,
            "Addon failed to send a heartbeat in time.",
        );
    }

    commit_status(&ctx, &instance, status).await?;

    Ok(Action::requeue(heartbeat_period(&instance)))
}

pub fn error_policy(instance: Arc<AddonInstance>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        namespace = instance.namespace().unwrap_or_default(),
        name = %instance.name_any(),
        error = %error,
        "AddonInstance reconciliation failed",
    );

    if let Some(health) = &ctx.health {
        health
            .metrics
            .record_error(CONTROLLER_NAME, &instance.name_any());
    }

    Action::requeue(BackoffConfig::default().delay_for_error(error, 0))
}
