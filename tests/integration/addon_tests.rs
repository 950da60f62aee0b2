//! End-to-end Addon lifecycle tests
//!
//! These verify the phased pipeline against a live cluster: namespace
//! creation, OLM object generation, monitoring federation and collision
//! handling. They do not wait for real operator workloads to come up, so a
//! cluster without a working OLM still exercises the unready reporting.

use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};

use k8s_openapi::api::core::v1::Namespace;

use addon_operator::controller::status::reasons;
use addon_operator::crd::{
    Addon, AddonInstance, CatalogSource, OperatorGroup, ServiceMonitor, Subscription,
};
use addon_operator::resources::common::{
    federated_service_monitor_name, monitoring_namespace_name,
};

use crate::{
    addon_condition_reason, addon_generation_observed, unique_name, wait_for, wait_for_deletion,
    wait_for_resource, AddonBuilder, DEFAULT_TIMEOUT, SHORT_TIMEOUT,
};

async fn client() -> Client {
    Client::try_default()
        .await
        .expect("kubeconfig must point at a reachable cluster")
}

async fn delete_addon(client: &Client, name: &str) {
    let addons: Api<Addon> = Api::all(client.clone());
    let _ = addons.delete(name, &DeleteParams::default()).await;
    let _ = wait_for_deletion(&addons, name, DEFAULT_TIMEOUT).await;
}

#[tokio::test]
#[ignore]
async fn test_own_namespace_addon_creates_install_surface() {
    let client = client().await;
    let name = unique_name("e2e-addon");
    let target_ns = format!("{}-ns", name);

    let addons: Api<Addon> = Api::all(client.clone());
    addons
        .create(&PostParams::default(), &AddonBuilder::new(&name).build())
        .await
        .expect("create addon");

    // Namespace comes first and carries the identity labels
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = wait_for_resource(&namespaces, &target_ns, DEFAULT_TIMEOUT)
        .await
        .expect("addon namespace created");
    let labels = ns.metadata.labels.as_ref().expect("identity labels");
    assert_eq!(labels.get("app.kubernetes.io/instance").unwrap(), &name);

    // OLM objects follow in the target namespace
    let groups: Api<OperatorGroup> = Api::namespaced(client.clone(), &target_ns);
    let group = wait_for_resource(&groups, &name, DEFAULT_TIMEOUT)
        .await
        .expect("operator group created");
    assert_eq!(group.spec.target_namespaces, vec![target_ns.clone()]);

    let sources: Api<CatalogSource> = Api::namespaced(client.clone(), &target_ns);
    let source = wait_for_resource(&sources, &name, DEFAULT_TIMEOUT)
        .await
        .expect("catalog source created");
    assert_eq!(source.spec.source_type, "grpc");

    let subscriptions: Api<Subscription> = Api::namespaced(client.clone(), &target_ns);
    let subscription = wait_for_resource(&subscriptions, &name, DEFAULT_TIMEOUT)
        .await
        .expect("subscription created");
    assert_eq!(subscription.spec.source, name);

    // The heartbeat contract object exists alongside the install
    let instances: Api<AddonInstance> = Api::namespaced(client.clone(), &target_ns);
    wait_for_resource(&instances, "addon-instance", DEFAULT_TIMEOUT)
        .await
        .expect("addon instance created");

    // Status caught up to the spec we submitted
    wait_for(&addons, &name, addon_generation_observed(), DEFAULT_TIMEOUT)
        .await
        .expect("observed generation");

    delete_addon(&client, &name).await;
    wait_for_deletion(&namespaces, &target_ns, DEFAULT_TIMEOUT)
        .await
        .expect("namespace garbage collected");
}

#[tokio::test]
#[ignore]
async fn test_broken_catalog_reports_unready() {
    let client = client().await;
    let name = unique_name("e2e-broken");

    let addons: Api<Addon> = Api::all(client.clone());
    addons
        .create(
            &PostParams::default(),
            &AddonBuilder::new(&name).with_broken_catalog().build(),
        )
        .await
        .expect("create addon");

    // The catalog never becomes READY, so availability stays blocked there
    wait_for(
        &addons,
        &name,
        addon_condition_reason("Available", reasons::UNREADY_CATALOG_SOURCE),
        DEFAULT_TIMEOUT,
    )
    .await
    .expect("unready catalog source reported");

    delete_addon(&client, &name).await;
}

#[tokio::test]
#[ignore]
async fn test_monitoring_federation_toggle() {
    let client = client().await;
    let name = unique_name("e2e-mon");
    let monitoring_ns = monitoring_namespace_name(&name);

    let addons: Api<Addon> = Api::all(client.clone());
    addons
        .create(
            &PostParams::default(),
            &AddonBuilder::new(&name)
                .with_federation("addon-prometheus")
                .build(),
        )
        .await
        .expect("create addon");

    let namespaces: Api<Namespace> = Api::all(client.clone());
    wait_for_resource(&namespaces, &monitoring_ns, DEFAULT_TIMEOUT)
        .await
        .expect("monitoring namespace created");

    let monitors: Api<ServiceMonitor> = Api::namespaced(client.clone(), &monitoring_ns);
    let monitor_name = federated_service_monitor_name(&name);
    wait_for_resource(&monitors, &monitor_name, DEFAULT_TIMEOUT)
        .await
        .expect("federation service monitor created");

    // Dropping the monitoring block tears the federation down again
    let patch = serde_json::json!({"spec": {"monitoring": null}});
    addons
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("remove monitoring spec");

    wait_for_deletion(&monitors, &monitor_name, DEFAULT_TIMEOUT)
        .await
        .expect("service monitor removed");
    wait_for_deletion(&namespaces, &monitoring_ns, DEFAULT_TIMEOUT)
        .await
        .expect("monitoring namespace removed");

    delete_addon(&client, &name).await;
}

#[tokio::test]
#[ignore]
async fn test_foreign_namespace_collision_is_reported() {
    let client = client().await;
    let name = unique_name("e2e-collide");
    let target_ns = format!("{}-ns", name);

    // Pre-create the namespace without identity labels, like a stranger would
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let foreign = Namespace {
        metadata: kube::core::ObjectMeta {
            name: Some(target_ns.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces
        .create(&PostParams::default(), &foreign)
        .await
        .expect("pre-create foreign namespace");

    let addons: Api<Addon> = Api::all(client.clone());
    addons
        .create(&PostParams::default(), &AddonBuilder::new(&name).build())
        .await
        .expect("create addon");

    wait_for(
        &addons,
        &name,
        addon_condition_reason("Available", reasons::COLLIDED_NAMESPACES),
        DEFAULT_TIMEOUT,
    )
    .await
    .expect("collision reported");

    // No OLM objects may land in the foreign namespace
    let subscriptions: Api<Subscription> = Api::namespaced(client.clone(), &target_ns);
    assert!(
        wait_for_resource(&subscriptions, &name, SHORT_TIMEOUT)
            .await
            .is_err(),
        "subscription must not be created in a collided namespace"
    );

    delete_addon(&client, &name).await;
    let _ = namespaces.delete(&target_ns, &DeleteParams::default()).await;
}

#[tokio::test]
#[ignore]
async fn test_paused_addon_freezes_status() {
    let client = client().await;
    let name = unique_name("e2e-paused");

    let addons: Api<Addon> = Api::all(client.clone());
    addons
        .create(
            &PostParams::default(),
            &AddonBuilder::new(&name).paused().build(),
        )
        .await
        .expect("create addon");

    wait_for(
        &addons,
        &name,
        addon_condition_reason("Paused", reasons::ADDON_PAUSED),
        DEFAULT_TIMEOUT,
    )
    .await
    .expect("paused condition reported");

    // Unpausing clears the condition again
    let patch = serde_json::json!({"spec": {"paused": false}});
    addons
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("unpause addon");

    let unpaused = wait_for(&addons, &name, addon_generation_observed(), DEFAULT_TIMEOUT)
        .await
        .expect("status caught up");
    let conditions = unpaused
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    assert!(
        !conditions.iter().any(|c| c.type_ == "Paused" && c.is_true()),
        "paused condition must be cleared on {}",
        unpaused.name_any()
    );

    delete_addon(&client, &name).await;
}
