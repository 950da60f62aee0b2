//! ObjectSet revision handover and ObjectDeployment rollout tests

use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};

use k8s_openapi::api::core::v1::{ConfigMap, Namespace};

use addon_operator::crd::{ObjectDeployment, ObjectSet, REVISION_ANNOTATION};
use addon_operator::objectset::compute_hash;

use crate::{
    config_map_object, config_map_self_probe, deployment_collision_count, object_set_archived,
    object_set_available, object_set_has_revision, single_phase_template, unique_name, wait_for,
    wait_for_resource, ObjectDeploymentBuilder, ObjectSetBuilder, DEFAULT_TIMEOUT,
};

async fn client() -> Client {
    Client::try_default()
        .await
        .expect("kubeconfig must point at a reachable cluster")
}

/// Create a throwaway namespace for one test
async fn test_namespace(client: &Client) -> String {
    let name = unique_name("e2e-rev");
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: kube::core::ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces
        .create(&PostParams::default(), &ns)
        .await
        .expect("create test namespace");
    name
}

async fn drop_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let _ = namespaces.delete(name, &DeleteParams::default()).await;
}

fn controller_uid(cm: &ConfigMap) -> Option<String> {
    cm.metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
        .map(|r| r.uid.clone())
}

#[tokio::test]
#[ignore]
async fn test_object_set_applies_and_probes_objects() {
    let client = client().await;
    let ns = test_namespace(&client).await;

    let sets: Api<ObjectSet> = Api::namespaced(client.clone(), &ns);
    sets.create(
        &PostParams::default(),
        &ObjectSetBuilder::new("rev-1", &ns)
            .with_probes(vec![config_map_self_probe()])
            .build(),
    )
    .await
    .expect("create object set");

    wait_for(&sets, "rev-1", object_set_has_revision(1), DEFAULT_TIMEOUT)
        .await
        .expect("first revision is numbered 1");
    wait_for(&sets, "rev-1", object_set_available(), DEFAULT_TIMEOUT)
        .await
        .expect("object set becomes available");

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &ns);
    let cm = wait_for_resource(&config_maps, "cm-1", DEFAULT_TIMEOUT)
        .await
        .expect("config map applied");
    let annotations = cm.metadata.annotations.as_ref().expect("annotations");
    assert_eq!(annotations.get(REVISION_ANNOTATION).unwrap(), "1");

    drop_namespace(&client, &ns).await;
}

#[tokio::test]
#[ignore]
async fn test_successor_revision_adopts_objects() {
    let client = client().await;
    let ns = test_namespace(&client).await;

    let sets: Api<ObjectSet> = Api::namespaced(client.clone(), &ns);
    sets.create(
        &PostParams::default(),
        &ObjectSetBuilder::new("rev-1", &ns).build(),
    )
    .await
    .expect("create first revision");

    wait_for(&sets, "rev-1", object_set_available(), DEFAULT_TIMEOUT)
        .await
        .expect("first revision available");

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &ns);
    let before = wait_for_resource(&config_maps, "cm-1", DEFAULT_TIMEOUT)
        .await
        .expect("config map applied");
    let rev1_uid = controller_uid(&before).expect("controller set");

    // The successor lists rev-1 in previous and ships a changed payload
    sets.create(
        &PostParams::default(),
        &ObjectSetBuilder::new("rev-2", &ns)
            .with_template(single_phase_template(
                "deploy",
                vec![config_map_object("cm-1", "v2")],
            ))
            .with_previous(&["rev-1"])
            .build(),
    )
    .await
    .expect("create second revision");

    wait_for(&sets, "rev-2", object_set_has_revision(2), DEFAULT_TIMEOUT)
        .await
        .expect("second revision is numbered 2");
    wait_for(&sets, "rev-2", object_set_available(), DEFAULT_TIMEOUT)
        .await
        .expect("second revision available");

    // Controller ownership moved over and the payload was updated
    let after = config_maps.get("cm-1").await.expect("config map survives");
    let rev2_uid = controller_uid(&after).expect("controller set");
    assert_ne!(rev1_uid, rev2_uid, "controller must move to the successor");
    let annotations = after.metadata.annotations.as_ref().expect("annotations");
    assert_eq!(annotations.get(REVISION_ANNOTATION).unwrap(), "2");
    let data = after.data.as_ref().expect("data");
    assert_eq!(data.get("value").unwrap(), "v2");

    // Archiving the predecessor must not delete the adopted object
    let patch = serde_json::json!({"spec": {"lifecycleState": "Archived"}});
    sets.patch("rev-1", &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("archive first revision");

    wait_for(&sets, "rev-1", object_set_archived(), DEFAULT_TIMEOUT)
        .await
        .expect("first revision archived");
    assert!(config_maps.get("cm-1").await.is_ok());

    drop_namespace(&client, &ns).await;
}

#[tokio::test]
#[ignore]
async fn test_deployment_rolls_out_revisions() {
    let client = client().await;
    let ns = test_namespace(&client).await;
    let name = "rollout";

    let deployments: Api<ObjectDeployment> = Api::namespaced(client.clone(), &ns);
    let deployment = ObjectDeploymentBuilder::new(name, &ns).build();
    let first_hash = compute_hash(&deployment.spec.template, None);
    deployments
        .create(&PostParams::default(), &deployment)
        .await
        .expect("create deployment");

    // The first revision carries the template hash in its name
    let sets: Api<ObjectSet> = Api::namespaced(client.clone(), &ns);
    let first_revision = format!("{}-{}", name, first_hash);
    wait_for(&sets, &first_revision, object_set_available(), DEFAULT_TIMEOUT)
        .await
        .expect("first revision available");

    // A template change produces a successor and retires the old revision
    let patch = serde_json::json!({
        "spec": {"template": {"spec": {
            "phases": [{
                "name": "deploy",
                "objects": [{"object": {
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": "cm-1"},
                    "data": {"value": "v2"},
                }}],
            }],
        }}},
    });
    deployments
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("update template");

    let updated = deployments.get(name).await.expect("deployment");
    let second_hash = compute_hash(&updated.spec.template, None);
    assert_ne!(first_hash, second_hash);

    let second_revision = format!("{}-{}", name, second_hash);
    wait_for(&sets, &second_revision, object_set_available(), DEFAULT_TIMEOUT)
        .await
        .expect("second revision available");
    wait_for(&sets, &first_revision, object_set_archived(), DEFAULT_TIMEOUT)
        .await
        .expect("first revision archived after handover");

    drop_namespace(&client, &ns).await;
}

#[tokio::test]
#[ignore]
async fn test_deployment_resolves_hash_collisions() {
    let client = client().await;
    let ns = test_namespace(&client).await;
    let name = "collide";

    let builder = ObjectDeploymentBuilder::new(name, &ns);
    let deployment = builder.build();
    let hash = compute_hash(&deployment.spec.template, None);

    // Occupy the desired revision name with a different template
    let sets: Api<ObjectSet> = Api::namespaced(client.clone(), &ns);
    let squatter = ObjectSetBuilder::new(&format!("{}-{}", name, hash), &ns)
        .with_template(single_phase_template(
            "deploy",
            vec![config_map_object("other", "other")],
        ))
        .build();
    sets.create(&PostParams::default(), &squatter)
        .await
        .expect("create squatting object set");

    let deployments: Api<ObjectDeployment> = Api::namespaced(client.clone(), &ns);
    deployments
        .create(&PostParams::default(), &deployment)
        .await
        .expect("create deployment");

    // The collision bumps the counter and the rollout proceeds under a new name
    wait_for(&deployments, name, deployment_collision_count(1), DEFAULT_TIMEOUT)
        .await
        .expect("collision count bumped");

    let rehashed = deployments.get(name).await.expect("deployment");
    let new_hash = compute_hash(&rehashed.spec.template, Some(1));
    let new_revision = format!("{}-{}", name, new_hash);
    let revision = wait_for_resource(&sets, &new_revision, DEFAULT_TIMEOUT)
        .await
        .expect("rehashed revision created");
    assert_ne!(revision.name_any(), squatter.name_any());

    drop_namespace(&client, &ns).await;
}
