use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use addon_operator::health::{HealthState, run_health_server};
use addon_operator::{
    DynamicCache, ObjectSetContext, Runtime, run_addon_controller, run_addon_instance_controller,
    run_addon_operator_controller, run_metrics_collector, run_objectdeployment_controller,
    run_objectset_controller,
};

/// Lease configuration
const LEASE_NAME: &str = "addon-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("addon_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();

    info!("Starting addon-operator");

    // Create Kubernetes client; the config is kept around so the revision
    // engine can build impersonated clients for phase writes
    let kube_config = kube::Config::infer().await?;
    let client = Client::try_from(kube_config.clone())?;
    info!("Connected to Kubernetes cluster");

    // Get pod identity for leader election
    let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
        warn!("POD_NAMESPACE not set, using 'default'");
        "default".to_string()
    });

    info!(
        holder_id = %pod_name,
        namespace = %namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Track leadership status
    let is_leader = Arc::new(AtomicBool::new(false));

    // Start health server immediately (probes should work even as non-leader)
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // Create leader election lease lock
    let lease_lock = LeaseLock::new(
        client.clone(),
        &namespace,
        LeaseLockParams {
            holder_id: pod_name.clone(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        },
    );

    // Acquire leadership before starting controllers
    info!("Waiting to acquire leadership...");
    loop {
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) => {
                if result.acquired_lease {
                    info!("Acquired leadership");
                    is_leader.store(true, Ordering::SeqCst);
                    break;
                } else {
                    info!("Another instance is leader, waiting...");
                }
            }
            Err(e) => {
                warn!("Failed to acquire lease: {}, retrying...", e);
            }
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    // Start lease renewal background task
    let lease_renewal_handle = {
        let is_leader = is_leader.clone();
        let lease_lock = LeaseLock::new(
            client.clone(),
            &namespace,
            LeaseLockParams {
                holder_id: pod_name,
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
            },
        );

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) => {
                        if !result.acquired_lease {
                            error!("Lost leadership! Shutting down...");
                            is_leader.store(false, Ordering::SeqCst);
                            // Exit so Kubernetes restarts us and we re-enter election
                            std::process::exit(1);
                        }
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        is_leader.store(false, Ordering::SeqCst);
                        std::process::exit(1);
                    }
                }
            }
        })
    };

    info!("Watching Addon resources (apiVersion: addons.managed.openshift.io/v1alpha1)");
    info!("Watching ObjectSet resources (apiVersion: package-operator.run/v1alpha1)");

    // Shared runtime: global pause flag, OCM handle and CSV remap table
    let (runtime, requeue_rx) = Runtime::new();

    // Revision engine shares one dynamic cache between both controllers
    let (cache_events_tx, cache_events_rx) = tokio::sync::mpsc::unbounded_channel();
    let cache = Arc::new(DynamicCache::new(client.clone(), cache_events_tx));
    let objectset_ctx = Arc::new(ObjectSetContext {
        client: client.clone(),
        config: Some(kube_config),
        cache,
        health: Some(health_state.clone()),
    });

    // Start the Addon controller (only runs as leader)
    let addon_controller_handle = {
        let health_state = health_state.clone();
        let controller_client = client.clone();
        let runtime = runtime.clone();
        tokio::spawn(async move {
            run_addon_controller(controller_client, runtime, requeue_rx, Some(health_state)).await;
        })
    };

    // Start the AddonOperator singleton controller
    let operator_controller_handle = {
        let health_state = health_state.clone();
        let operator_client = client.clone();
        let runtime = runtime.clone();
        tokio::spawn(async move {
            run_addon_operator_controller(operator_client, runtime, Some(health_state)).await;
        })
    };

    // Start the AddonInstance heartbeat controller
    let instance_controller_handle = {
        let health_state = health_state.clone();
        let instance_client = client.clone();
        let runtime = runtime.clone();
        tokio::spawn(async move {
            run_addon_instance_controller(instance_client, runtime, Some(health_state)).await;
        })
    };

    // Start the revision-engine controllers
    let objectset_controller_handle = {
        let objectset_client = client.clone();
        let ctx = objectset_ctx.clone();
        tokio::spawn(async move {
            run_objectset_controller(objectset_client, ctx, cache_events_rx).await;
        })
    };
    let deployment_controller_handle = {
        let deployment_client = client.clone();
        let ctx = objectset_ctx;
        tokio::spawn(async move {
            run_objectdeployment_controller(deployment_client, ctx).await;
        })
    };

    // Keep fleet metrics fresh
    let metrics_handle = {
        let metrics_client = client.clone();
        let health_state = health_state.clone();
        tokio::spawn(async move {
            run_metrics_collector(metrics_client, health_state).await;
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = addon_controller_handle => {
            if let Err(e) = result {
                error!("Addon controller task panicked: {}", e);
            }
        }
        result = operator_controller_handle => {
            if let Err(e) = result {
                error!("AddonOperator controller task panicked: {}", e);
            }
        }
        result = instance_controller_handle => {
            if let Err(e) = result {
                error!("AddonInstance controller task panicked: {}", e);
            }
        }
        result = objectset_controller_handle => {
            if let Err(e) = result {
                error!("ObjectSet controller task panicked: {}", e);
            }
        }
        result = deployment_controller_handle => {
            if let Err(e) = result {
                error!("ObjectDeployment controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        result = metrics_handle => {
            if let Err(e) = result {
                error!("Metrics collector task panicked: {}", e);
            }
        }
        // Lease renewal task only exits via process::exit() or panic
        // so this branch is only reached on panic
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            // Give in-flight reconciliations time to complete
            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
