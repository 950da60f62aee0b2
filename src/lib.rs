pub mod cache;
pub mod controller;
pub mod crd;
pub mod health;
pub mod objectset;
pub mod ocm;
pub mod owners;
pub mod resources;

pub use cache::DynamicCache;
pub use controller::{
    BackoffConfig, Context, CsvEventTable, CsvKey, Error, PhaseResult, Result, Runtime,
    error_policy, reconcile,
};
pub use crd::{Addon, AddonInstance, AddonOperator, ObjectDeployment, ObjectSet};
pub use health::{HealthState, Metrics};
pub use objectset::ObjectSetContext;
pub use ocm::{HttpOcmClient, OcmClient};

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::Controller;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, ResourceExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::controller::addon_instance_reconciler;
use crate::controller::addon_operator_reconciler;
use crate::crd::{
    AddonPhase, CatalogSource, ClusterServiceVersion, OperatorGroup, ServiceMonitor, Subscription,
};

/// Turn a requeue-all channel into a stream the controller can consume.
fn requeue_stream(rx: UnboundedReceiver<()>) -> impl futures::Stream<Item = ()> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|trigger| (trigger, rx))
    })
}

/// Run the Addon controller (cluster-wide).
///
/// Watches Addon resources and all downstream kinds the pipeline manages,
/// plus ClusterServiceVersions remapped onto Addons through the runtime's
/// CSV event table. The `requeue_rx` stream re-enqueues every Addon on a
/// global pause flip or OCM client injection.
pub async fn run_addon_controller(
    client: Client,
    runtime: Arc<Runtime>,
    requeue_rx: UnboundedReceiver<()>,
    health_state: Option<Arc<HealthState>>,
) {
    tracing::info!("Starting controller for Addon resources");

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), runtime.clone(), health_state));

    let addons: Api<Addon> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let addon_instances: Api<AddonInstance> = Api::all(client.clone());
    let operator_groups: Api<OperatorGroup> = Api::all(client.clone());
    let catalog_sources: Api<CatalogSource> = Api::all(client.clone());
    let subscriptions: Api<Subscription> = Api::all(client.clone());
    let service_monitors: Api<ServiceMonitor> = Api::all(client.clone());
    let csvs: Api<ClusterServiceVersion> = Api::all(client.clone());

    // Use any_semantic() for more reliable resource discovery in test environments
    let watcher_config = WatcherConfig::default().any_semantic();

    let csv_runtime = runtime.clone();
    Controller::new(addons, watcher_config.clone())
        .owns(namespaces, watcher_config.clone())
        .owns(addon_instances, watcher_config.clone())
        .owns(operator_groups, watcher_config.clone())
        .owns(catalog_sources, watcher_config.clone())
        .owns(subscriptions, watcher_config.clone())
        .owns(service_monitors, watcher_config.clone())
        .watches(csvs, watcher_config, move |csv: ClusterServiceVersion| {
            // CSVs are not owner-referenced; route events through the remap table
            let key = CsvKey::new(&csv.namespace().unwrap_or_default(), &csv.name_any());
            csv_runtime
                .csv_events
                .addon_for(&key)
                .map(|addon| ObjectRef::new(&addon))
        })
        .reconcile_all_on(requeue_stream(requeue_rx))
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // ObjectNotFound/NotFound errors are expected after deletion when
                    // related watch events trigger reconciliation for a deleted object.
                    // Log these at debug level instead of error.
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Addon controller stream ended unexpectedly");
}

/// Run the AddonOperator singleton controller.
///
/// Creates the default singleton when missing, then keeps the global pause
/// flag and the OCM client handle in sync with its spec.
pub async fn run_addon_operator_controller(
    client: Client,
    runtime: Arc<Runtime>,
    health_state: Option<Arc<HealthState>>,
) {
    tracing::info!("Starting controller for the AddonOperator singleton");

    if let Err(e) = addon_operator_reconciler::ensure_default_addon_operator(client.clone()).await {
        tracing::error!("Failed to create default AddonOperator: {}", e);
    }

    let ctx = Arc::new(Context::new(client.clone(), runtime, health_state));
    let operators: Api<AddonOperator> = Api::all(client);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(operators, watcher_config)
        .run(
            addon_operator_reconciler::reconcile,
            addon_operator_reconciler::error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled AddonOperator: {}", obj.name);
                }
                Err(e) => {
                    tracing::error!("AddonOperator reconciliation error: {:?}", e);
                }
            }
        })
        .await;

    tracing::error!("AddonOperator controller stream ended unexpectedly");
}

/// Run the AddonInstance heartbeat controller (cluster-wide).
pub async fn run_addon_instance_controller(
    client: Client,
    runtime: Arc<Runtime>,
    health_state: Option<Arc<HealthState>>,
) {
    tracing::info!("Starting controller for AddonInstance resources");

    let ctx = Arc::new(Context::new(client.clone(), runtime, health_state));
    let instances: Api<AddonInstance> = Api::all(client);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(instances, watcher_config)
        .run(
            addon_instance_reconciler::reconcile,
            addon_instance_reconciler::error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled AddonInstance: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _)
                            if format!("{:?}", err).contains("NotFound")
                    );
                    if is_not_found {
                        tracing::debug!("AddonInstance no longer exists: {:?}", e);
                    } else {
                        tracing::error!("AddonInstance reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::error!("AddonInstance controller stream ended unexpectedly");
}

/// Run the ObjectSet controller (cluster-wide).
///
/// Managed objects are arbitrary kinds, so ownership cannot be expressed as
/// typed `owns` relations; instead every dynamic cache event re-enqueues all
/// ObjectSets through `cache_events`.
pub async fn run_objectset_controller(
    client: Client,
    ctx: Arc<ObjectSetContext>,
    cache_events: UnboundedReceiver<()>,
) {
    tracing::info!("Starting controller for ObjectSet resources");

    let object_sets: Api<ObjectSet> = Api::all(client);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(object_sets, watcher_config)
        .reconcile_all_on(requeue_stream(cache_events))
        .run(
            objectset::reconciler::reconcile,
            objectset::reconciler::error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled ObjectSet: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _)
                            if format!("{:?}", err).contains("NotFound")
                    );
                    if is_not_found {
                        tracing::debug!("ObjectSet no longer exists: {:?}", e);
                    } else {
                        tracing::error!("ObjectSet reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::error!("ObjectSet controller stream ended unexpectedly");
}

/// Run the ObjectDeployment controller (cluster-wide).
pub async fn run_objectdeployment_controller(client: Client, ctx: Arc<ObjectSetContext>) {
    tracing::info!("Starting controller for ObjectDeployment resources");

    let deployments: Api<ObjectDeployment> = Api::all(client.clone());
    let object_sets: Api<ObjectSet> = Api::all(client);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(deployments, watcher_config.clone())
        .owns(object_sets, watcher_config)
        .run(
            objectset::deployment::reconcile,
            objectset::deployment::error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled ObjectDeployment: {}", obj.name);
                }
                Err(e) => {
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _)
                            if format!("{:?}", err).contains("NotFound")
                    );
                    if is_not_found {
                        tracing::debug!("ObjectDeployment no longer exists: {:?}", e);
                    } else {
                        tracing::error!("ObjectDeployment reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::error!("ObjectDeployment controller stream ended unexpectedly");
}

/// Periodically refresh the addons-by-phase gauge.
pub async fn run_metrics_collector(client: Client, health_state: Arc<HealthState>) {
    let addons: Api<Addon> = Api::all(client);
    let mut interval = tokio::time::interval(Duration::from_secs(60));

    loop {
        interval.tick().await;

        let list = match addons.list(&Default::default()).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Failed to list addons for metrics: {}", e);
                continue;
            }
        };

        let mut pending = 0;
        let mut ready = 0;
        let mut terminating = 0;
        let mut error = 0;
        for addon in &list.items {
            match addon.status.as_ref().and_then(|s| s.phase) {
                Some(AddonPhase::Ready) => ready += 1,
                Some(AddonPhase::Terminating) => terminating += 1,
                Some(AddonPhase::Error) => error += 1,
                Some(AddonPhase::Pending) | None => pending += 1,
            }
        }

        health_state.metrics.set_addons_by_phase("Pending", pending);
        health_state.metrics.set_addons_by_phase("Ready", ready);
        health_state
            .metrics
            .set_addons_by_phase("Terminating", terminating);
        health_state.metrics.set_addons_by_phase("Error", error);
    }
}
