//! Unit tests for revision-engine adoption decisions and template hashing

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::ObjectMeta;

use addon_operator::crd::{ObjectSetTemplatePhase, ObjectSetTemplateSpec, REVISION_ANNOTATION};
use addon_operator::objectset::adoption::object_revision;
use addon_operator::objectset::{check_adoption, compute_hash, AdoptionDecision, RevisionError};

fn controlled_meta(controller_uid: &str, revision: i64) -> ObjectMeta {
    ObjectMeta {
        name: Some("workload".to_string()),
        namespace: Some("team-a".to_string()),
        annotations: Some(BTreeMap::from([(
            REVISION_ANNOTATION.to_string(),
            revision.to_string(),
        )])),
        owner_references: Some(vec![OwnerReference {
            api_version: "package-operator.run/v1alpha1".to_string(),
            kind: "ObjectSet".to_string(),
            name: "some-revision".to_string(),
            uid: controller_uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]),
        ..Default::default()
    }
}

fn uids(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_handover_from_listed_predecessor() {
    let meta = controlled_meta("rev1-uid", 1);
    let decision = check_adoption("rev2-uid", 2, &meta, &uids(&["rev1-uid"]));
    assert_eq!(decision, Ok(AdoptionDecision::Adopt));
}

#[test]
fn test_object_of_unlisted_owner_is_refused() {
    let meta = controlled_meta("foreign-uid", 1);
    let result = check_adoption("rev2-uid", 2, &meta, &uids(&["rev1-uid"]));
    assert!(matches!(
        result,
        Err(RevisionError::NotOwnedByPreviousRevision { .. })
    ));
}

#[test]
fn test_equal_revision_under_other_owner_collides() {
    let meta = controlled_meta("rev1-uid", 2);
    let result = check_adoption("rev2-uid", 2, &meta, &uids(&["rev1-uid"]));
    assert!(matches!(result, Err(RevisionError::RevisionCollision { .. })));
}

#[test]
fn test_newer_revision_wins_without_error() {
    // rev3 already took the object over; rev2 must not fight for it
    let meta = controlled_meta("rev3-uid", 3);
    let decision = check_adoption("rev2-uid", 2, &meta, &uids(&["rev1-uid"]));
    assert_eq!(decision, Ok(AdoptionDecision::AlreadySettled));
}

#[test]
fn test_revision_annotation_parsing() {
    assert_eq!(object_revision(&controlled_meta("uid", 7)), 7);

    let mut meta = controlled_meta("uid", 7);
    meta.annotations = None;
    assert_eq!(object_revision(&meta), 0);

    let mut meta = controlled_meta("uid", 7);
    meta.annotations = Some(BTreeMap::from([(
        REVISION_ANNOTATION.to_string(),
        "not-a-number".to_string(),
    )]));
    assert_eq!(object_revision(&meta), 0);
}

#[test]
fn test_template_hash_changes_with_content_and_collisions() {
    let template = ObjectSetTemplateSpec {
        phases: vec![ObjectSetTemplatePhase {
            name: "deploy".to_string(),
            class: None,
            objects: vec![],
        }],
        availability_probes: vec![],
    };

    let base = compute_hash(&template, None);
    assert_eq!(base, compute_hash(&template.clone(), None));
    assert_ne!(base, compute_hash(&template, Some(1)));

    let mut changed = template.clone();
    changed.phases[0].name = "configure".to_string();
    assert_ne!(base, compute_hash(&changed, None));
}
