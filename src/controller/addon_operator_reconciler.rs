//! AddonOperator singleton reconciler: global pause coordination, OCM
//! client injection and operator readiness reporting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::{condition_types, reasons};
use crate::controller::Context;
use crate::crd::{
    condition_status, remove_condition, set_condition, AddonOperator, AddonOperatorPhase,
    AddonOperatorSpec, AddonOperatorStatus, ADDON_OPERATOR_NAME,
};
use crate::ocm::HttpOcmClient;

/// The singleton requeues itself to refresh its heartbeat
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Secret key holding the OCM access token
const ACCESS_TOKEN_KEY: &str = "accessToken";

pub const CONTROLLER_NAME: &str = "addon-operator";

/// Create the default AddonOperator singleton when absent. Called once at
/// startup; the reconciler keeps it alive afterwards.
pub async fn ensure_default_addon_operator(client: kube::Client) -> Result<()> {
    let api: Api<AddonOperator> = Api::all(client);
    if api.get_opt(ADDON_OPERATOR_NAME).await?.is_some() {
        return Ok(());
    }

    let default = AddonOperator {
        metadata: kube::api::ObjectMeta {
            name: Some(ADDON_OPERATOR_NAME.to_string()),
            ..Default::default()
        },
        spec: AddonOperatorSpec::default(),
        status: None,
    };
    api.create(&PostParams::default(), &default).await?;
    info!("Created default AddonOperator singleton");
    Ok(())
}

async fn build_ocm_client(ctx: &Context, operator: &AddonOperator) -> Result<Option<HttpOcmClient>> {
    let Some(ocm) = operator.spec.ocm.as_ref() else {
        return Ok(None);
    };
    if ctx.runtime.has_ocm_client().await {
        return Ok(None);
    }

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &ocm.secret.namespace);
    let secret = secrets.get(&ocm.secret.name).await?;
    let token_bytes = secret
        .data
        .as_ref()
        .and_then(|d| d.get(ACCESS_TOKEN_KEY))
        .ok_or_else(|| {
            Error::ConfigurationError(format!(
                "secret {}/{} has no {} key",
                ocm.secret.namespace, ocm.secret.name, ACCESS_TOKEN_KEY
            ))
        })?;
    let token = String::from_utf8(token_bytes.0.clone())
        .map_err(|_| Error::ConfigurationError("OCM access token is not valid UTF-8".to_string()))?;

    Ok(Some(HttpOcmClient::new(&ocm.endpoint, &token)))
}

async fn commit_status(ctx: &Context, operator: &AddonOperator, status: AddonOperatorStatus) -> Result<()> {
    if operator.status.as_ref() == Some(&status) {
        return Ok(());
    }
    let api: Api<AddonOperator> = Api::all(ctx.client.clone());
    let mut updated = operator.clone();
    updated.status = Some(status);
    api.replace_status(
        &operator.name_any(),
        &PostParams::default(),
        serde_json::to_vec(&updated)?,
    )
    .await?;
    Ok(())
}

pub async fn reconcile(operator: Arc<AddonOperator>, ctx: Arc<Context>) -> Result<Action> {
    let generation = operator.metadata.generation;
    let mut status = operator.status.clone().unwrap_or_default();
    status.observed_generation = generation;
    status.last_heartbeat_time = Some(Utc::now().to_rfc3339());

    // Every actual flip re-enqueues all Addons
    let flipped = ctx.runtime.set_paused(operator.spec.paused).await;
    if flipped {
        info!(paused = operator.spec.paused, "Global pause flag changed");
    }

    if operator.spec.paused {
        set_condition(
            &mut status.conditions,
            generation,
            condition_types::PAUSED,
            condition_status::TRUE,
            reasons::ADDON_OPERATOR_PAUSED,
            "Addon reconciliation is paused cluster-wide.",
        );
    } else {
        remove_condition(&mut status.conditions, condition_types::PAUSED);
    }

    if let Some(client) = build_ocm_client(&ctx, &operator).await? {
        ctx.runtime.inject_ocm_client(Arc::new(client)).await;
        info!("Injected OCM client, re-enqueueing all addons");
    }

    set_condition(
        &mut status.conditions,
        generation,
        condition_types::AVAILABLE,
        condition_status::TRUE,
        reasons::FULLY_RECONCILED,
        "Addon Operator is ready to serve.",
    );
    status.phase = Some(AddonOperatorPhase::Ready);

    commit_status(&ctx, &operator, status).await?;

    Ok(Action::requeue(RESYNC_INTERVAL))
}

pub fn error_policy(operator: Arc<AddonOperator>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(name = %operator.name_any(), error = %error, "AddonOperator reconciliation failed");

    if let Some(health) = &ctx.health {
        health
            .metrics
            .record_error(CONTROLLER_NAME, &operator.name_any());
    }

    Action::requeue(BackoffConfig::default().delay_for_error(error, 0))
}
